//! Error handling module for guest process emulation

use std::fmt;
use std::io;

use crate::core::types::{Handle, KType, Size, VirtAddr};

/// Common error type returned by process operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// Handle not present in the handle table
    InvalidHandle(Handle),
    /// Handle present but bound to an object of another type
    TypeMismatch {
        /// Handle that was looked up
        handle: Handle,
        /// Type the caller asked for
        expected: KType,
        /// Type of the stored object
        actual: KType,
    },
    /// The memory channel failed to read or write guest memory
    MemoryAccessFailure {
        /// Guest address of the access
        address: VirtAddr,
        /// Length of the access in bytes
        size: Size,
        /// Kind of the underlying I/O error
        kind: io::ErrorKind,
        /// Message of the underlying I/O error
        message: String,
    },
    /// Backing memory for a new TLS page could not be allocated
    UnresolvedTlsAllocation {
        /// Address the page was requested at
        address: VirtAddr,
        /// Why the allocation failed
        reason: String,
    },
    /// A region allocator refused a request
    RegionAllocation {
        /// Requested base address
        address: VirtAddr,
        /// Requested size in bytes
        size: Size,
        /// Why the allocation failed
        reason: String,
    },
    /// The handle counter has no values left
    HandlesExhausted,
    /// A TLS slot index past the end of its page
    SlotOutOfRange(u8),
    /// A lifecycle transition that is not a single forward step
    InvalidStateTransition {
        /// State the process was in
        from: &'static str,
        /// State that was requested
        to: &'static str,
    },
    /// The memory channel could not be opened
    ChannelOpen {
        /// Path of the channel
        path: String,
        /// Message of the underlying I/O error
        message: String,
    },
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::InvalidHandle(handle) => {
                write!(f, "Invalid handle: 0x{:X}", handle)
            }
            KernelError::TypeMismatch { handle, expected, actual } => write!(
                f,
                "Tried to get kernel object (0x{:X}) with different type: {} when object is {}",
                handle, expected, actual
            ),
            KernelError::MemoryAccessFailure { address, size, message, .. } => write!(
                f,
                "Memory access failure at 0x{:X} ({} bytes): {}",
                address, size, message
            ),
            KernelError::UnresolvedTlsAllocation { address, reason } => {
                write!(f, "Unable to allocate TLS page at 0x{:X}: {}", address, reason)
            }
            KernelError::RegionAllocation { address, size, reason } => write!(
                f,
                "Unable to allocate region 0x{:X} (0x{:X} bytes): {}",
                address, size, reason
            ),
            KernelError::HandlesExhausted => f.write_str("Handle table exhausted"),
            KernelError::SlotOutOfRange(slot) => write!(f, "TLS slot out of range: {}", slot),
            KernelError::InvalidStateTransition { from, to } => {
                write!(f, "Invalid process state transition: {} -> {}", from, to)
            }
            KernelError::ChannelOpen { path, message } => {
                write!(f, "Unable to open memory channel {}: {}", path, message)
            }
        }
    }
}

impl std::error::Error for KernelError {}

/// Result type for operations that can fail
pub type Result<T> = std::result::Result<T, KernelError>;

/// Creates a memory access failure from a channel I/O error
pub fn memory_access(address: VirtAddr, size: Size, err: &io::Error) -> KernelError {
    KernelError::MemoryAccessFailure {
        address,
        size,
        kind: err.kind(),
        message: err.to_string(),
    }
}

/// Creates a TLS allocation failure out of the error that caused it
pub fn unresolved_tls(address: VirtAddr, cause: &KernelError) -> KernelError {
    KernelError::UnresolvedTlsAllocation {
        address,
        reason: cause.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_access_keeps_kind() {
        let err = io::Error::new(io::ErrorKind::UnexpectedEof, "short read");
        match memory_access(0x1000, 8, &err) {
            KernelError::MemoryAccessFailure { address, size, kind, message } => {
                assert_eq!(address, 0x1000);
                assert_eq!(size, 8);
                assert_eq!(kind, io::ErrorKind::UnexpectedEof);
                assert_eq!(message, "short read");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_type_mismatch_message() {
        let err = KernelError::TypeMismatch {
            handle: 0xD001,
            expected: KType::Event,
            actual: KType::Thread,
        };
        assert_eq!(
            err.to_string(),
            "Tried to get kernel object (0xD001) with different type: KEvent when object is KThread"
        );
    }

    #[test]
    fn test_unresolved_tls_wraps_cause() {
        let cause = KernelError::SlotOutOfRange(9);
        let err = unresolved_tls(0x4000, &cause);
        assert_eq!(
            err,
            KernelError::UnresolvedTlsAllocation {
                address: 0x4000,
                reason: "TLS slot out of range: 9".to_string(),
            }
        );
    }
}
