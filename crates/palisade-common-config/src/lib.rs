//! Configuration types for Palisade.
//!
//! This crate provides the configuration types used by Palisade
//! for `.palisade/config.yaml` files.

pub mod env;
pub mod loader;
pub mod types;

pub use env::*;
pub use loader::*;
pub use types::*;
