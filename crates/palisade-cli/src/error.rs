//! CLI error type.

use palisade_common_config::{ConfigError, EnvError};
use palisade_common_log::LogError;
use palisade_security::LockStoreError;
use thiserror::Error;

use crate::Exit;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("environment error: {0}")]
    Env(#[from] EnvError),

    #[error(transparent)]
    Log(#[from] LogError),

    #[error("lock store {path}: {source}")]
    LockStore {
        path: String,
        #[source]
        source: LockStoreError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("output error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("output error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0}")]
    Validation(String),
}

impl CliError {
    pub fn lock_store(path: impl Into<String>, source: LockStoreError) -> Self {
        Self::LockStore {
            path: path.into(),
            source,
        }
    }

    pub fn exit_code(&self) -> Exit {
        match self {
            Self::Config(_) | Self::Env(_) => Exit::ConfigError,
            Self::Io(_) => Exit::IoError,
            Self::LockStore { source, .. } => match source {
                LockStoreError::Io(_) => Exit::IoError,
                _ => Exit::ValidationError,
            },
            Self::Validation(_) => Exit::ValidationError,
            Self::Log(_) | Self::Json(_) | Self::Yaml(_) => Exit::GeneralError,
        }
    }
}
