//! Common test utilities for kernel integration tests
//!
//! Test doubles for the collaborators a process consumes: a region
//! allocator, a thread factory and a handful of kernel object types, plus a
//! sparse temporary file standing in for the guest address space.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use gkp_api::{
    GuestMemory, GuestThread, Handle, KType, KernelError, KernelObject, MemoryState, Priority,
    RegionAllocator, RegionRequest, Result, Size, Tid, TypedObject, VirtAddr,
};
use gkp_kernel::{Process, ProcessConfig, ThreadFactory, ThreadParams};
use gkp_memory::FileChannel;
use tempfile::NamedTempFile;

/// Guest thread double
#[derive(Debug)]
pub struct TestThread {
    pub handle: Handle,
    pub priority: Priority,
    pub tid: Tid,
    pub tls: VirtAddr,
}

impl TestThread {
    pub fn new(handle: Handle, priority: Priority) -> Self {
        Self { handle, priority, tid: handle, tls: 0 }
    }
}

impl KernelObject for TestThread {
    fn object_type(&self) -> KType {
        KType::Thread
    }

    fn into_thread(self: Arc<Self>) -> Option<Arc<dyn GuestThread>> {
        Some(self)
    }
}

impl TypedObject for TestThread {
    const TYPE: KType = KType::Thread;
}

impl GuestThread for TestThread {
    fn handle(&self) -> Handle {
        self.handle
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn tid(&self) -> Tid {
        self.tid
    }
}

/// Private memory double
#[derive(Debug)]
pub struct TestRegion {
    pub address: VirtAddr,
    pub size: Size,
    pub state: MemoryState,
}

impl KernelObject for TestRegion {
    fn object_type(&self) -> KType {
        KType::PrivateMemory
    }

    fn into_memory(self: Arc<Self>) -> Option<Arc<dyn GuestMemory>> {
        Some(self)
    }
}

impl TypedObject for TestRegion {
    const TYPE: KType = KType::PrivateMemory;
}

impl GuestMemory for TestRegion {
    fn address(&self) -> VirtAddr {
        self.address
    }

    fn size(&self) -> Size {
        self.size
    }
}

/// Shared memory double
#[derive(Debug)]
pub struct TestSharedMemory {
    pub address: VirtAddr,
    pub size: Size,
}

impl KernelObject for TestSharedMemory {
    fn object_type(&self) -> KType {
        KType::SharedMemory
    }

    fn into_memory(self: Arc<Self>) -> Option<Arc<dyn GuestMemory>> {
        Some(self)
    }
}

impl TypedObject for TestSharedMemory {
    const TYPE: KType = KType::SharedMemory;
}

impl GuestMemory for TestSharedMemory {
    fn address(&self) -> VirtAddr {
        self.address
    }

    fn size(&self) -> Size {
        self.size
    }
}

/// Event double
#[derive(Debug)]
pub struct TestEvent {
    pub id: u32,
}

impl KernelObject for TestEvent {
    fn object_type(&self) -> KType {
        KType::Event
    }
}

impl TypedObject for TestEvent {
    const TYPE: KType = KType::Event;
}

/// Session double
#[derive(Debug)]
pub struct TestSession;

impl KernelObject for TestSession {
    fn object_type(&self) -> KType {
        KType::Session
    }
}

impl TypedObject for TestSession {
    const TYPE: KType = KType::Session;
}

/// Region allocator that records requests and can be told to fail
#[derive(Default)]
pub struct TestAllocator {
    pub requests: Mutex<Vec<RegionRequest>>,
    pub fail_state: Mutex<Option<MemoryState>>,
}

impl TestAllocator {
    pub fn fail_on(&self, state: MemoryState) {
        *self.fail_state.lock().unwrap() = Some(state);
    }

    pub fn requests_for(&self, state: MemoryState) -> Vec<RegionRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.state == state)
            .copied()
            .collect()
    }
}

impl RegionAllocator for TestAllocator {
    fn allocate(&self, request: &RegionRequest) -> Result<Arc<dyn GuestMemory>> {
        if *self.fail_state.lock().unwrap() == Some(request.state) {
            return Err(KernelError::RegionAllocation {
                address: request.address,
                size: request.size,
                reason: "backing store exhausted".to_string(),
            });
        }
        self.requests.lock().unwrap().push(*request);
        Ok(Arc::new(TestRegion {
            address: request.address,
            size: request.size,
            state: request.state,
        }))
    }
}

/// Thread factory handing out sequential host thread ids
pub struct TestThreadFactory {
    next_tid: AtomicU32,
    pub created: Mutex<Vec<ThreadParams>>,
}

impl Default for TestThreadFactory {
    fn default() -> Self {
        Self {
            next_tid: AtomicU32::new(1000),
            created: Mutex::new(Vec::new()),
        }
    }
}

impl ThreadFactory for TestThreadFactory {
    fn create(&self, params: ThreadParams) -> Result<Arc<dyn GuestThread>> {
        let thread = TestThread {
            handle: params.handle,
            priority: params.priority,
            tid: self.next_tid.fetch_add(1, Ordering::SeqCst),
            tls: params.tls,
        };
        self.created.lock().unwrap().push(params);
        Ok(Arc::new(thread))
    }
}

/// A process wired to test collaborators
pub struct TestProcess {
    pub process: Arc<Process>,
    pub allocator: Arc<TestAllocator>,
    pub factory: Arc<TestThreadFactory>,
    _memory: NamedTempFile,
}

/// Creates a sparse file covering the default guest layout
pub fn guest_memory_file() -> NamedTempFile {
    let config = ProcessConfig::default();
    let end = config.layout.heap_base + config.heap_size as u64;
    let file = NamedTempFile::new().expect("Failed to create guest memory file");
    file.as_file().set_len(end).expect("Failed to size guest memory file");
    file
}

/// Creates a process with the default configuration
pub fn new_process() -> TestProcess {
    new_process_with(ProcessConfig::default())
}

/// Creates a process with `config`
pub fn new_process_with(config: ProcessConfig) -> TestProcess {
    let memory = guest_memory_file();
    let channel = FileChannel::open(memory.path()).expect("Failed to open guest memory");
    let allocator = Arc::new(TestAllocator::default());
    let factory = Arc::new(TestThreadFactory::default());
    let process = Process::new(config, Box::new(channel), allocator.clone(), factory.clone());
    TestProcess { process, allocator, factory, _memory: memory }
}

/// An address inside the default heap, for mutexes and condition variables
pub fn heap_address(offset: u64) -> VirtAddr {
    ProcessConfig::default().layout.heap_base + offset
}

/// Polls `condition` until it holds, panicking after five seconds
pub fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "Timed out waiting for condition");
        thread::sleep(Duration::from_millis(1));
    }
}
