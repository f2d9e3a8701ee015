//! Process life-cycle state

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use gkp_api::{KernelError, Result};

/// Current status of a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ProcessStatus {
    /// The process was created but the main thread has not started yet
    Created = 0,
    /// The main thread has started executing
    Started = 1,
    /// The process is being torn down
    Exiting = 2,
}

impl ProcessStatus {
    /// Name of the status
    pub const fn as_str(self) -> &'static str {
        match self {
            ProcessStatus::Created => "Created",
            ProcessStatus::Started => "Started",
            ProcessStatus::Exiting => "Exiting",
        }
    }

    /// The only status this one may move to
    pub const fn next(self) -> Option<ProcessStatus> {
        match self {
            ProcessStatus::Created => Some(ProcessStatus::Started),
            ProcessStatus::Started => Some(ProcessStatus::Exiting),
            ProcessStatus::Exiting => None,
        }
    }

    const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => ProcessStatus::Created,
            1 => ProcessStatus::Started,
            _ => ProcessStatus::Exiting,
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomically updated status that only moves one step forward at a time
#[derive(Debug)]
pub struct StatusCell(AtomicU8);

impl StatusCell {
    /// Creates a cell in the `Created` status
    pub const fn new() -> Self {
        Self(AtomicU8::new(ProcessStatus::Created as u8))
    }

    /// Current status
    pub fn get(&self) -> ProcessStatus {
        ProcessStatus::from_raw(self.0.load(Ordering::Acquire))
    }

    /// Moves to `to`, which must directly follow the current status
    pub fn advance(&self, to: ProcessStatus) -> Result<ProcessStatus> {
        let mut current = self.get();
        loop {
            if current.next() != Some(to) {
                return Err(KernelError::InvalidStateTransition {
                    from: current.as_str(),
                    to: to.as_str(),
                });
            }
            match self.0.compare_exchange(
                current as u8,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(current),
                Err(raw) => current = ProcessStatus::from_raw(raw),
            }
        }
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}
