//! transform/mod.rs
//! User transforms as registered capabilities.
//!
//! Notes:
//! - A transform maps one element per input slot to one element per output slot.
//! - Concrete transforms are compiled in and selected by name from the registry.
//! - Errors are never caught by the runtime; they end the worker.

pub mod types;
pub mod registry;
pub mod builtin;

pub use types::*;
pub use registry::*;
pub use builtin::{IdentityTransform, InvertTransform};
