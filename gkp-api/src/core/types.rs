//! Core types used throughout guest process emulation

use std::fmt;

/// Kernel object handle as seen by the guest
pub type Handle = u32;

/// Host thread identifier of an emulated guest thread
pub type Tid = u32;

/// Guest thread priority (higher value is scheduled first)
pub type Priority = u8;

/// Guest virtual address type
pub type VirtAddr = u64;

/// Size type
pub type Size = usize;

/// First handle value a process hands out
pub const BASE_HANDLE_INDEX: Handle = 0xD000;

/// Priority assigned to the main thread of a process
pub const DEFAULT_PRIORITY: Priority = 44;

/// Runtime type tag carried by every kernel object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KType {
    /// Guest thread
    Thread,
    /// Guest process
    Process,
    /// Memory shared between processes
    SharedMemory,
    /// Memory transferred to another process
    TransferMemory,
    /// Memory private to one process
    PrivateMemory,
    /// IPC session
    Session,
    /// Signalable event
    Event,
}

impl KType {
    /// Whether objects of this type own a range of guest memory
    pub const fn is_memory(self) -> bool {
        matches!(
            self,
            KType::SharedMemory | KType::TransferMemory | KType::PrivateMemory
        )
    }
}

impl fmt::Display for KType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KType::Thread => "KThread",
            KType::Process => "KProcess",
            KType::SharedMemory => "KSharedMemory",
            KType::TransferMemory => "KTransferMemory",
            KType::PrivateMemory => "KPrivateMemory",
            KType::Session => "KSession",
            KType::Event => "KEvent",
        };
        f.write_str(name)
    }
}
