//! Known key signatures and the offsets at which key candidates sit.

mod registry;
mod signature;

pub use registry::*;
pub use signature::*;

/// Length in bytes of a key candidate.
pub const KEY_LEN: usize = 32;
