//! The guest process
//!
//! A [`Process`] owns everything a guest process keeps in the kernel: its
//! handle table, the index of its threads, its TLS pages, its heap, the
//! channel used to reach its memory, and the wait queues of the user-mode
//! mutexes and condition variables its threads block on. Every piece of
//! shared state sits behind its own critical section so any number of
//! emulated guest threads may call in concurrently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use bytemuck::Pod;
use gkp_api::error::unresolved_tls;
use gkp_api::{
    GuestMemory, GuestThread, Handle, HandleOut, KType, KernelError, KernelObject, MemoryChannel,
    MemoryState, Priority, RegionAllocator, RegionRequest, Result, Size, Tid, TypedObject,
    VirtAddr,
};
use gkp_memory::{MemoryAccessor, PAGE_SIZE, TlsPageList};
use hashbrown::HashMap;
use log::{debug, info};
use spin::Mutex;

use super::handle_table::HandleTable;
use super::lifecycle::{ProcessStatus, StatusCell};
use super::thread::{ThreadFactory, ThreadParams};
use crate::config::ProcessConfig;
use crate::sync::{WaitLock, WaitQueueMap};

/// Kernel state of one guest process
pub struct Process {
    /// Weak self reference handed to the threads of this process
    this: Weak<Process>,
    config: ProcessConfig,
    status: StatusCell,
    /// Sync-object signal, raised when the process terminates
    signalled: AtomicBool,
    memory: MemoryAccessor,
    handles: HandleTable,
    /// Threads of this process keyed by host thread id
    threads: Mutex<HashMap<Tid, Arc<dyn GuestThread>>>,
    main_thread: Mutex<Option<Tid>>,
    tls_pages: Mutex<TlsPageList>,
    heap: Mutex<Option<HandleOut<dyn GuestMemory>>>,
    allocator: Arc<dyn RegionAllocator>,
    thread_factory: Arc<dyn ThreadFactory>,
    /// Threads waiting on guest mutexes, keyed by mutex address
    pub(crate) mutexes: WaitLock<WaitQueueMap>,
    /// Threads waiting on guest condition variables, keyed by address
    pub(crate) conditionals: WaitLock<WaitQueueMap>,
}

impl Process {
    /// Creates a process in the `Created` status
    ///
    /// `channel` is owned by the process from here on and released when the
    /// process is dropped.
    pub fn new(
        config: ProcessConfig,
        channel: Box<dyn MemoryChannel>,
        allocator: Arc<dyn RegionAllocator>,
        thread_factory: Arc<dyn ThreadFactory>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            config,
            status: StatusCell::new(),
            signalled: AtomicBool::new(false),
            memory: MemoryAccessor::new(channel),
            handles: HandleTable::new(config.base_handle_index),
            threads: Mutex::new(HashMap::new()),
            main_thread: Mutex::new(None),
            tls_pages: Mutex::new(TlsPageList::new(config.layout.tls_io_base)),
            heap: Mutex::new(None),
            allocator,
            thread_factory,
            mutexes: WaitLock::new(WaitQueueMap::new()),
            conditionals: WaitLock::new(WaitQueueMap::new()),
        })
    }

    /// Configuration the process was created with
    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Life cycle
    // ------------------------------------------------------------------

    /// Current life-cycle status
    pub fn status(&self) -> ProcessStatus {
        self.status.get()
    }

    /// Moves to `status`, which must be the step right after the current one
    pub fn set_status(&self, status: ProcessStatus) -> Result<()> {
        let previous = self.status.advance(status)?;
        info!("Process status {} -> {}", previous, status);
        Ok(())
    }

    /// Marks the process signalled
    pub fn signal(&self) {
        self.signalled.store(true, Ordering::Release);
    }

    /// Whether the process is signalled
    pub fn is_signalled(&self) -> bool {
        self.signalled.load(Ordering::Acquire)
    }

    /// Clears the signalled flag so the process can be waited on again
    pub fn reset_signal(&self) {
        self.signalled.store(false, Ordering::Release);
    }

    // ------------------------------------------------------------------
    // Memory
    // ------------------------------------------------------------------

    /// Maps the heap and the first TLS page
    ///
    /// Runs once before any thread executes; calling it again is a no-op
    /// for whatever already exists.
    pub fn initialize_memory(&self) -> Result<()> {
        {
            let mut heap = self.heap.lock();
            if heap.is_none() {
                let request = RegionRequest::read_write(
                    self.config.layout.heap_base,
                    self.config.heap_size,
                    MemoryState::Heap,
                );
                let item = self.allocator.allocate(&request)?;
                let handle = self.handles.insert_memory(item.clone())?;
                debug!(
                    "Mapped heap at 0x{:X} (0x{:X} bytes) as handle 0x{:X}",
                    item.address(),
                    item.size(),
                    handle
                );
                *heap = Some(HandleOut { item, handle });
            }
        }

        let mut pages = self.tls_pages.lock();
        if pages.is_empty() {
            pages.grow(|address| self.map_tls_page(address))?;
        }
        Ok(())
    }

    /// Heap region, once `initialize_memory` has run
    pub fn heap(&self) -> Option<HandleOut<dyn GuestMemory>> {
        self.heap.lock().clone()
    }

    /// Reads `destination.len()` bytes of guest memory at `address`
    pub fn read_memory(&self, destination: &mut [u8], address: VirtAddr) -> Result<()> {
        self.memory.read_memory(destination, address)
    }

    /// Writes `source` to guest memory at `address`
    pub fn write_memory(&self, source: &[u8], address: VirtAddr) -> Result<()> {
        self.memory.write_memory(source, address)
    }

    /// Copies `size` bytes of guest memory from `source` to `destination`
    pub fn copy_memory(&self, source: VirtAddr, destination: VirtAddr, size: Size) -> Result<()> {
        self.memory.copy_memory(source, destination, size)
    }

    /// Reads a `T` from guest memory
    pub fn read_value<T: Pod>(&self, address: VirtAddr) -> Result<T> {
        self.memory.read_value(address)
    }

    /// Writes a `T` to guest memory
    pub fn write_value<T: Pod>(&self, item: &T, address: VirtAddr) -> Result<()> {
        self.memory.write_value(item, address)
    }

    /// Reserves a TLS slot, mapping a new TLS page when all pages are full
    pub fn get_tls_slot(&self) -> Result<VirtAddr> {
        let mut pages = self.tls_pages.lock();
        pages.get_slot(|address| self.map_tls_page(address))
    }

    /// Number of TLS pages mapped so far
    pub fn tls_page_count(&self) -> usize {
        self.tls_pages.lock().len()
    }

    fn map_tls_page(&self, address: VirtAddr) -> Result<VirtAddr> {
        let layout = &self.config.layout;
        if !layout.is_tls_address(address) {
            return Err(KernelError::UnresolvedTlsAllocation {
                address,
                reason: "TLS/IO region exhausted".to_string(),
            });
        }
        let request = RegionRequest::read_write(address, PAGE_SIZE, MemoryState::ThreadLocal);
        let item = self
            .allocator
            .allocate(&request)
            .map_err(|err| unresolved_tls(address, &err))?;
        let base = item.address();
        self.handles
            .insert_memory(item)
            .map_err(|err| unresolved_tls(address, &err))?;
        Ok(base)
    }

    /// Finds the memory object owning `address`
    pub fn get_memory_object(&self, address: VirtAddr) -> Option<HandleOut<dyn GuestMemory>> {
        self.handles.memory_object(address)
    }

    // ------------------------------------------------------------------
    // Handles
    // ------------------------------------------------------------------

    /// Constructs a new object and binds it to the next handle
    ///
    /// `build` is handed the handle being assigned.
    pub fn new_handle<T, F>(&self, build: F) -> Result<HandleOut<T>>
    where
        T: TypedObject,
        F: FnOnce(Handle) -> Result<T>,
    {
        self.handles.new_handle(build)
    }

    /// Binds an already constructed object to the next handle
    pub fn insert_item(&self, item: Arc<dyn KernelObject>) -> Result<Handle> {
        self.handles.insert_item(item)
    }

    /// Looks up a handle and checks that it holds a `T`
    pub fn get_handle<T: TypedObject>(&self, handle: Handle) -> Result<Arc<T>> {
        self.handles.get_handle(handle)
    }

    /// Looks up a handle without checking its type
    pub fn get_object(&self, handle: Handle) -> Result<Arc<dyn KernelObject>> {
        self.handles.get_object(handle)
    }

    /// Binds the object behind `handle` to a second handle
    pub fn duplicate_handle(&self, handle: Handle) -> Result<Handle> {
        self.handles.duplicate_handle(handle)
    }

    /// Removes a handle from the table
    pub fn delete_handle(&self, handle: Handle) -> Option<Arc<dyn KernelObject>> {
        self.handles.delete_handle(handle)
    }

    /// Number of live handles
    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }

    // ------------------------------------------------------------------
    // Threads
    // ------------------------------------------------------------------

    /// Creates a thread in this process
    ///
    /// The thread gets a fresh TLS slot and the next handle, and is indexed
    /// by its host thread id.
    pub fn create_thread(
        &self,
        entry_point: VirtAddr,
        entry_argument: u64,
        stack_top: VirtAddr,
        priority: Priority,
    ) -> Result<HandleOut<dyn GuestThread>> {
        let tls = self.get_tls_slot()?;
        let handle = self.handles.reserve()?;
        let item = self.thread_factory.create(ThreadParams {
            process: self.this.clone(),
            handle,
            entry_point,
            entry_argument,
            stack_top,
            tls,
            priority,
        })?;

        self.handles.insert_at(handle, item.clone());
        self.threads.lock().insert(item.tid(), item.clone());
        debug!(
            "Created thread {} (handle 0x{:X}, TLS 0x{:X}, priority {})",
            item.tid(),
            handle,
            tls,
            priority
        );
        Ok(HandleOut { item, handle })
    }

    /// Creates the main thread with the default priority
    pub fn create_main_thread(
        &self,
        entry_point: VirtAddr,
        stack_top: VirtAddr,
    ) -> Result<HandleOut<dyn GuestThread>> {
        let out = self.create_thread(entry_point, 0, stack_top, self.config.default_priority)?;
        *self.main_thread.lock() = Some(out.item.tid());
        Ok(out)
    }

    /// Thread with host thread id `tid`
    pub fn thread(&self, tid: Tid) -> Option<Arc<dyn GuestThread>> {
        self.threads.lock().get(&tid).cloned()
    }

    /// Main thread, once created
    pub fn main_thread(&self) -> Option<Arc<dyn GuestThread>> {
        let tid = (*self.main_thread.lock())?;
        self.thread(tid)
    }

    /// Number of threads created in this process
    pub fn thread_count(&self) -> usize {
        self.threads.lock().len()
    }
}

impl KernelObject for Process {
    fn object_type(&self) -> KType {
        KType::Process
    }
}

impl TypedObject for Process {
    const TYPE: KType = KType::Process;
}

impl Drop for Process {
    fn drop(&mut self) {
        debug!(
            "Releasing process ({} handles, {} threads), closing memory channel",
            self.handles.len(),
            self.threads.lock().len()
        );
    }
}
