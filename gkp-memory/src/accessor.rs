//! Positioned access to the guest address space

use bytemuck::Pod;
use gkp_api::error::memory_access;
use gkp_api::{MemoryChannel, Result, Size, VirtAddr};
use log::error;

/// Reads, writes and copies guest memory through a [`MemoryChannel`]
///
/// Channel failures are not retried; they surface as
/// `KernelError::MemoryAccessFailure` carrying the faulting address.
pub struct MemoryAccessor {
    channel: Box<dyn MemoryChannel>,
}

impl MemoryAccessor {
    /// Creates an accessor owning `channel`
    pub fn new(channel: Box<dyn MemoryChannel>) -> Self {
        Self { channel }
    }

    /// Reads `destination.len()` bytes of guest memory at `address`
    pub fn read_memory(&self, destination: &mut [u8], address: VirtAddr) -> Result<()> {
        if destination.is_empty() {
            return Ok(());
        }
        self.channel.read_at(destination, address).map_err(|err| {
            error!("Failed to read 0x{:X} bytes at 0x{:X}: {}", destination.len(), address, err);
            memory_access(address, destination.len(), &err)
        })
    }

    /// Writes all of `source` to guest memory at `address`
    pub fn write_memory(&self, source: &[u8], address: VirtAddr) -> Result<()> {
        if source.is_empty() {
            return Ok(());
        }
        self.channel.write_at(source, address).map_err(|err| {
            error!("Failed to write 0x{:X} bytes at 0x{:X}: {}", source.len(), address, err);
            memory_access(address, source.len(), &err)
        })
    }

    /// Copies `size` bytes of guest memory from `source` to `destination`
    pub fn copy_memory(&self, source: VirtAddr, destination: VirtAddr, size: Size) -> Result<()> {
        let mut buffer = vec![0u8; size];
        self.read_memory(&mut buffer, source)?;
        self.write_memory(&buffer, destination)
    }

    /// Reads a value of type `T` from guest memory
    pub fn read_value<T: Pod>(&self, address: VirtAddr) -> Result<T> {
        let mut item = T::zeroed();
        self.read_memory(bytemuck::bytes_of_mut(&mut item), address)?;
        Ok(item)
    }

    /// Writes a value of type `T` to guest memory
    pub fn write_value<T: Pod>(&self, item: &T, address: VirtAddr) -> Result<()> {
        self.write_memory(bytemuck::bytes_of(item), address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;

    /// Guest memory backed by a plain byte vector
    struct VecChannel(Mutex<Vec<u8>>);

    impl MemoryChannel for VecChannel {
        fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
            let memory = self.0.lock().unwrap();
            let start = offset as usize;
            let end = start + buf.len();
            let src = memory.get(start..end).ok_or(io::ErrorKind::UnexpectedEof)?;
            buf.copy_from_slice(src);
            Ok(())
        }

        fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
            let mut memory = self.0.lock().unwrap();
            let start = offset as usize;
            let end = start + buf.len();
            let dst = memory.get_mut(start..end).ok_or(io::ErrorKind::WriteZero)?;
            dst.copy_from_slice(buf);
            Ok(())
        }
    }

    fn accessor(size: usize) -> MemoryAccessor {
        MemoryAccessor::new(Box::new(VecChannel(Mutex::new(vec![0; size]))))
    }

    #[test]
    fn test_typed_values() {
        let memory = accessor(0x100);
        memory.write_value(&0xDEAD_BEEFu32, 0x10).unwrap();
        memory.write_value(&0x0123_4567_89AB_CDEFu64, 0x20).unwrap();
        assert_eq!(memory.read_value::<u32>(0x10).unwrap(), 0xDEAD_BEEF);
        assert_eq!(memory.read_value::<u64>(0x20).unwrap(), 0x0123_4567_89AB_CDEF);
    }

    #[test]
    fn test_copy_memory() {
        let memory = accessor(0x100);
        memory.write_memory(b"guest", 0x00).unwrap();
        memory.copy_memory(0x00, 0x80, 5).unwrap();
        let mut out = [0u8; 5];
        memory.read_memory(&mut out, 0x80).unwrap();
        assert_eq!(&out, b"guest");
    }

    #[test]
    fn test_out_of_range_is_memory_failure() {
        let memory = accessor(0x10);
        let err = memory.read_value::<u64>(0x0C).unwrap_err();
        assert!(matches!(
            err,
            gkp_api::KernelError::MemoryAccessFailure { address: 0x0C, size: 8, .. }
        ));
    }

    #[test]
    fn test_empty_access_is_noop() {
        let memory = accessor(0);
        memory.read_memory(&mut [], 0x1000).unwrap();
        memory.write_memory(&[], 0x1000).unwrap();
    }
}
