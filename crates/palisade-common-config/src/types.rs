//! Configuration types.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PalisadeConfig {
    /// Authorization engine settings.
    pub security: SecurityConfig,
    /// Lock table persistence.
    pub locks: LockConfig,
    /// Logging output.
    pub logging: LoggingConfig,
}

impl Default for PalisadeConfig {
    fn default() -> Self {
        Self {
            security: SecurityConfig::default(),
            locks: LockConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Authorization engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Capacity of the permission verdict cache.
    pub permission_cache_size: usize,
    /// Accounts that can never be deleted.
    pub default_users: DefaultUsers,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            permission_cache_size: 1000,
            default_users: DefaultUsers::default(),
        }
    }
}

/// Names of the built-in accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultUsers {
    pub admin: String,
    pub guest: String,
    pub export: String,
}

impl DefaultUsers {
    /// Whether `name` is one of the built-in accounts.
    pub fn is_default_user(&self, name: &str) -> bool {
        [&self.admin, &self.guest, &self.export]
            .into_iter()
            .any(|default| default == name)
    }
}

impl Default for DefaultUsers {
    fn default() -> Self {
        Self {
            admin: "Admin".to_string(),
            guest: "Guest".to_string(),
            export: "Export".to_string(),
        }
    }
}

/// Lock table persistence configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// File the lock table is written to at shutdown.
    pub store_path: String,
    /// Keep temporary locks across restarts.
    pub persist_temporary: bool,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            store_path: ".palisade/locks.json".to_string(),
            persist_temporary: false,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of trace, debug, info, warn, error.
    pub level: String,
    /// One of pretty, compact, json.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
