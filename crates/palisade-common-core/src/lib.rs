//! Palisade common core types.

pub mod id;

pub use id::*;
