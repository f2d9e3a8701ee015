//! GKP API - Core interfaces and types for guest kernel process emulation
//!
//! This crate provides the vocabulary shared by the memory and kernel crates:
//! the handle and thread identifier types, the closed set of kernel object
//! types, the capability traits kernel objects implement, and the interfaces
//! of the collaborators a process consumes but does not own.
//!
//! # Architecture
//!
//! - **Core**: Identifier types and guest-wide constants
//! - **Error**: The error taxonomy shared by every process operation
//! - **Object**: Kernel object capabilities and typed views
//! - **Memory**: Memory channel and region allocation interfaces
//!
//! # Usage
//!
//! ```rust
//! use gkp_api::{KType, KernelError, Result};
//!
//! fn lookup(found: Option<KType>) -> Result<KType> {
//!     found.ok_or(KernelError::InvalidHandle(0xD000))
//! }
//!
//! assert!(lookup(None).is_err());
//! assert_eq!(lookup(Some(KType::Event)).unwrap(), KType::Event);
//! ```

pub mod core;
pub mod error;
pub mod memory;
pub mod object;

// Re-export commonly used types
pub use crate::core::types::*;
pub use crate::error::{KernelError, Result};
pub use crate::memory::interface::{MemoryChannel, RegionAllocator};
pub use crate::memory::types::{MemoryPermission, MemoryState, RegionRequest};
pub use crate::object::{AsAny, GuestMemory, GuestThread, HandleOut, KernelObject, TypedObject};
