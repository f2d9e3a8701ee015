//! Collaborator interfaces for guest memory

use std::io;
use std::sync::Arc;

use crate::error::Result;
use crate::memory::types::RegionRequest;
use crate::object::GuestMemory;

/// Raw channel into the guest address space
///
/// Offsets are guest virtual addresses. Both calls transfer the whole
/// buffer or fail; a short transfer is reported as an error.
pub trait MemoryChannel: Send + Sync {
    /// Fills `buf` with guest memory starting at `offset`
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()>;

    /// Writes all of `buf` to guest memory starting at `offset`
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<()>;
}

/// Creates the memory objects backing process regions
///
/// The backing store strategy (private, shared or transfer memory) belongs
/// to the implementor; the process only keeps the returned object and its
/// address range.
pub trait RegionAllocator: Send + Sync {
    /// Maps a new region as described by `request`
    fn allocate(&self, request: &RegionRequest) -> Result<Arc<dyn GuestMemory>>;
}
