//! Memory interfaces consumed by the process

pub mod interface;
pub mod types;

pub use interface::*;
pub use types::*;
