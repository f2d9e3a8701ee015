//! File-backed memory channel
//!
//! Guest memory is reached through a file whose offsets are guest virtual
//! addresses, normally `/proc/<pid>/mem` of the host process hosting the
//! guest. All accesses use positioned I/O so concurrent callers never share
//! a file cursor.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use gkp_api::{KernelError, MemoryChannel, Result};
use log::debug;

/// Memory channel over a host file descriptor
///
/// The descriptor is opened when the channel is created and closed when the
/// channel is dropped.
#[derive(Debug)]
pub struct FileChannel {
    file: File,
    path: PathBuf,
}

impl FileChannel {
    /// Opens `path` read-write as a memory channel
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|err| KernelError::ChannelOpen {
                path: path.display().to_string(),
                message: err.to_string(),
            })?;
        debug!("Opened memory channel {}", path.display());
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Opens the memory file of host process `pid`
    pub fn for_process(pid: u32) -> Result<Self> {
        Self::open(format!("/proc/{}/mem", pid))
    }

    /// Path the channel was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MemoryChannel for FileChannel {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        self.file.read_exact_at(buf, offset)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        self.file.write_all_at(buf, offset)
    }
}

impl Drop for FileChannel {
    fn drop(&mut self) {
        debug!("Closing memory channel {}", self.path.display());
    }
}
