//! GKP Kernel
//!
//! Per-process kernel state of an emulated guest operating system. A
//! [`Process`] owns the guest's handle table, its thread-local storage
//! pages, its heap and the channel into its address space, and emulates the
//! guest's user-mode mutexes and condition variables on top of host
//! threads: one host thread per guest thread, blocking for real while a
//! guest thread waits.
//!
//! The instruction execution engine, the scheduler and the memory object
//! implementations are collaborators; they plug in through
//! [`ThreadFactory`], [`gkp_api::RegionAllocator`] and
//! [`gkp_api::MemoryChannel`].

pub mod config;
pub mod process;
pub mod sync;

pub use config::ProcessConfig;
pub use process::{HandleTable, Process, ProcessStatus, ThreadFactory, ThreadParams};
pub use sync::{CONDVAR_SIGNAL_ALL, MUTEX_OWNER_MASK, MUTEX_WAITERS_BIT, WaitStatus};
