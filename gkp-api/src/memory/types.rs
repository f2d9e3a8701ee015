//! Memory region request types

use crate::core::types::{Size, VirtAddr};

bitflags::bitflags! {
    /// Access permissions of a guest memory region
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemoryPermission: u8 {
        const READ    = 0b0000_0001;
        const WRITE   = 0b0000_0010;
        const EXECUTE = 0b0000_0100;
    }
}

impl MemoryPermission {
    /// Read-write, the permission of heap and TLS regions
    pub const RW: Self = Self::READ.union(Self::WRITE);
}

/// What a guest memory region is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryState {
    /// Process heap
    Heap,
    /// Thread-local storage pages
    ThreadLocal,
}

/// Parameters of a region allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionRequest {
    /// Base guest address the region is mapped at
    pub address: VirtAddr,
    /// Size of the region in bytes
    pub size: Size,
    /// Access permissions
    pub permission: MemoryPermission,
    /// Usage of the region
    pub state: MemoryState,
}

impl RegionRequest {
    /// Creates a read-write request for `state`
    pub const fn read_write(address: VirtAddr, size: Size, state: MemoryState) -> Self {
        Self {
            address,
            size,
            permission: MemoryPermission::RW,
            state,
        }
    }

    /// Exclusive end address of the requested region
    pub const fn end(&self) -> VirtAddr {
        self.address + self.size as u64
    }
}
