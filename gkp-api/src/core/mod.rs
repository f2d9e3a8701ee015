//! Core module containing identifier types and guest-wide constants

pub mod types;

pub use types::*;
