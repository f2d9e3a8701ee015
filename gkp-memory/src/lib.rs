//! GKP Memory
//!
//! This crate provides access to the guest address space and the
//! bookkeeping of thread-local storage pages. It includes the guest layout
//! constants, a positioned-I/O memory channel and the TLS slot allocator.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod accessor;
pub mod channel;
pub mod layout;
pub mod tls;

pub use accessor::MemoryAccessor;
pub use channel::FileChannel;
pub use layout::{GuestLayout, PAGE_SIZE, TLS_SLOTS, TLS_SLOT_SIZE};
pub use tls::{TlsPage, TlsPageList};
