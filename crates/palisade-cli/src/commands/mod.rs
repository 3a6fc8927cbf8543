//! Subcommand implementations.

mod config;
mod locks;

pub use config::ConfigCommand;
pub use locks::LocksCommand;
