//! Lock table persistence.
//!
//! The lock table lives in memory. It is loaded once at startup and written back at
//! shutdown through a [`LockStore`].

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::lock::Lock;

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

/// Lock store errors.
#[derive(Debug, Error)]
pub enum LockStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unsupported lock file version {found}")]
    UnsupportedVersion { found: u32 },
}

/// Durable side-table for lock records.
pub trait LockStore: Send + Sync {
    fn load(&self) -> Result<Vec<Lock>, LockStoreError>;

    fn save(&self, locks: &[Lock]) -> Result<(), LockStoreError>;

    /// Human-readable location, used in log messages.
    fn describe(&self) -> String;
}

#[derive(Debug, Serialize, Deserialize)]
struct LockFile {
    version: u32,
    locks: Vec<Lock>,
}

/// JSON file store.
#[derive(Debug, Clone)]
pub struct FileLockStore {
    path: PathBuf,
}

impl FileLockStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LockStore for FileLockStore {
    /// A missing file is an empty table.
    fn load(&self) -> Result<Vec<Lock>, LockStoreError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No lock file, starting empty");
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)?;
        let file: LockFile = serde_json::from_str(&content)?;
        if file.version != FORMAT_VERSION {
            return Err(LockStoreError::UnsupportedVersion { found: file.version });
        }
        Ok(file.locks)
    }

    fn save(&self, locks: &[Lock]) -> Result<(), LockStoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = LockFile {
            version: FORMAT_VERSION,
            locks: locks.to_vec(),
        };
        let content = serde_json::to_string_pretty(&file)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory store, for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryLockStore {
    locks: Mutex<Vec<Lock>>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_locks(locks: Vec<Lock>) -> Self {
        Self {
            locks: Mutex::new(locks),
        }
    }

    pub fn stored(&self) -> Vec<Lock> {
        self.locks.lock().clone()
    }
}

impl LockStore for MemoryLockStore {
    fn load(&self) -> Result<Vec<Lock>, LockStoreError> {
        Ok(self.locks.lock().clone())
    }

    fn save(&self, locks: &[Lock]) -> Result<(), LockStoreError> {
        *self.locks.lock() = locks.to_vec();
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
