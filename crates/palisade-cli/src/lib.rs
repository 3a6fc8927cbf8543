//! Palisade administration CLI.
//!
//! Inspects and validates the configuration and the persisted lock table of an installation.

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

use std::process::ExitCode;

pub use error::CliError;

/// Process exit codes.
#[repr(u8)]
pub enum Exit {
    Success = 0,
    GeneralError = 1,
    ConfigError = 2,
    IoError = 3,
    ValidationError = 5,
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        ExitCode::from(exit as u8)
    }
}
