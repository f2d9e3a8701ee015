//! Thread construction seam
//!
//! Threads are built by the scheduler side of the emulator; the process
//! only decides the handle, TLS slot and priority and keeps the result.

use std::sync::{Arc, Weak};

use gkp_api::{GuestThread, Handle, Priority, Result, VirtAddr};

use super::Process;

/// Everything a new guest thread is constructed from
#[derive(Debug, Clone)]
pub struct ThreadParams {
    /// Owning process, for memory access and synchronization callbacks
    pub process: Weak<Process>,
    /// Handle the thread will be stored under
    pub handle: Handle,
    /// Address to start execution at
    pub entry_point: VirtAddr,
    /// Argument passed to the entry point
    pub entry_argument: u64,
    /// Top of the thread's stack
    pub stack_top: VirtAddr,
    /// Thread-local storage slot of the thread
    pub tls: VirtAddr,
    /// Scheduling priority
    pub priority: Priority,
}

/// Creates guest threads on behalf of a process
pub trait ThreadFactory: Send + Sync {
    /// Constructs the thread described by `params`
    fn create(&self, params: ThreadParams) -> Result<Arc<dyn GuestThread>>;
}
