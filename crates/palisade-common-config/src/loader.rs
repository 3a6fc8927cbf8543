//! Configuration file loading and parsing.

use crate::env::{vars, EnvError, Environment};
use crate::types::PalisadeConfig;
use regex::Regex;
use std::path::{Path, PathBuf};
use thiserror::Error;

const CONFIG_DIR: &str = ".palisade";
const CONFIG_FILE: &str = "config.yaml";
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

/// Config loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("failed to read config: {source}")]
    ReadError {
        #[from]
        source: std::io::Error,
    },

    #[error("invalid YAML at line {}: {message}", line.map(|l| l.to_string()).unwrap_or_else(|| "unknown".to_string()))]
    ParseError { line: Option<usize>, message: String },

    #[error("validation error: {message}")]
    ValidationError { message: String },

    #[error("environment variable not found: {var}")]
    EnvVarNotFound { var: String },

    #[error(transparent)]
    Env(#[from] EnvError),
}

impl ConfigError {
    fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }
}

/// Configuration loader.
pub struct ConfigLoader {
    base_path: PathBuf,
}

impl ConfigLoader {
    /// Create a loader for the given installation directory.
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_dir.as_ref().to_path_buf(),
        }
    }

    /// Create a loader for `PALISADE_CONFIG_DIR`, or the current directory.
    pub fn from_env() -> Self {
        match Environment::get(vars::PALISADE_CONFIG_DIR) {
            Some(dir) => Self::new(dir),
            None => Self::default(),
        }
    }

    /// Path of the configuration file.
    pub fn config_path(&self) -> PathBuf {
        self.base_path.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Load configuration from `.palisade/config.yaml`.
    pub fn load(&self) -> Result<PalisadeConfig, ConfigError> {
        let config_path = self.config_path();

        if !config_path.exists() {
            return Ok(PalisadeConfig::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;
        let expanded = self.expand_env_vars(&contents)?;

        let config: PalisadeConfig = serde_yaml::from_str(&expanded).map_err(|e| ConfigError::ParseError {
            line: e.location().map(|l| l.line()),
            message: e.to_string(),
        })?;

        self.validate(&config)?;
        Ok(config)
    }

    /// Load like [`Self::load`] but fail when the file is missing.
    pub fn load_required(&self) -> Result<PalisadeConfig, ConfigError> {
        let config_path = self.config_path();
        if !config_path.exists() {
            return Err(ConfigError::NotFound { path: config_path });
        }
        self.load()
    }

    /// Apply `PALISADE_*` overrides on top of a loaded configuration.
    pub fn apply_env_overrides(&self, config: &mut PalisadeConfig) -> Result<(), ConfigError> {
        if let Some(size) = Environment::get_int::<usize>(vars::PALISADE_PERMISSION_CACHE_SIZE)? {
            config.security.permission_cache_size = size;
        }
        if let Some(path) = Environment::get(vars::PALISADE_LOCK_STORE) {
            config.locks.store_path = path;
        }
        if let Some(persist) = Environment::get_bool(vars::PALISADE_PERSIST_TEMPORARY_LOCKS) {
            config.locks.persist_temporary = persist;
        }
        if let Some(level) = Environment::get(vars::PALISADE_LOG_LEVEL) {
            config.logging.level = level.to_lowercase();
        }
        self.validate(config)
    }

    /// Expand environment variables in the form `${VAR}` or `${VAR:-default}`.
    fn expand_env_vars(&self, content: &str) -> Result<String, ConfigError> {
        let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").map_err(|e| ConfigError::ParseError {
            line: None,
            message: e.to_string(),
        })?;

        let mut result = content.to_string();
        for cap in re.captures_iter(content) {
            let Some(full_match) = cap.get(0) else { continue };
            let var_name = &cap[1];
            let default = cap.get(2).map(|m| m.as_str());

            let value = match std::env::var(var_name) {
                Ok(v) => v,
                Err(_) => match default {
                    Some(d) => d.to_string(),
                    None => {
                        return Err(ConfigError::EnvVarNotFound {
                            var: var_name.to_string(),
                        })
                    }
                },
            };

            result = result.replace(full_match.as_str(), &value);
        }

        Ok(result)
    }

    /// Validate configuration values.
    pub fn validate(&self, config: &PalisadeConfig) -> Result<(), ConfigError> {
        if config.security.permission_cache_size == 0 {
            return Err(ConfigError::validation(
                "security.permission_cache_size must be greater than 0",
            ));
        }

        let defaults = &config.security.default_users;
        for (key, name) in [("admin", &defaults.admin), ("guest", &defaults.guest), ("export", &defaults.export)] {
            if name.trim().is_empty() {
                return Err(ConfigError::validation(format!(
                    "security.default_users.{} must not be empty",
                    key
                )));
            }
        }

        if config.locks.store_path.trim().is_empty() {
            return Err(ConfigError::validation("locks.store_path must not be empty"));
        }

        if !LOG_LEVELS.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::validation(format!(
                "logging.level must be one of {}",
                LOG_LEVELS.join(", ")
            )));
        }
        if !LOG_FORMATS.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::validation(format!(
                "logging.format must be one of {}",
                LOG_FORMATS.join(", ")
            )));
        }

        Ok(())
    }

    /// Save configuration to file.
    pub fn save(&self, config: &PalisadeConfig) -> Result<(), ConfigError> {
        let config_dir = self.base_path.join(CONFIG_DIR);
        std::fs::create_dir_all(&config_dir)?;

        let yaml = serde_yaml::to_string(config).map_err(|e| ConfigError::ParseError {
            line: None,
            message: e.to_string(),
        })?;

        std::fs::write(config_dir.join(CONFIG_FILE), yaml)?;
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new(std::env::current_dir().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_config(dir: &Path, content: &str) {
        let palisade_dir = dir.join(".palisade");
        fs::create_dir_all(&palisade_dir).unwrap();
        fs::write(palisade_dir.join("config.yaml"), content).unwrap();
    }

    #[test]
    fn test_load_defaults_when_no_file() {
        let dir = tempdir().unwrap();
        let loader = ConfigLoader::new(dir.path());
        let config = loader.load().unwrap();
        assert_eq!(config.security.permission_cache_size, 1000);
        assert_eq!(config.locks.store_path, ".palisade/locks.json");
    }

    #[test]
    fn test_load_required_reports_missing_file() {
        let dir = tempdir().unwrap();
        let loader = ConfigLoader::new(dir.path());
        assert!(matches!(loader.load_required(), Err(ConfigError::NotFound { .. })));
    }

    #[test]
    fn test_load_config_from_yaml_file() {
        let dir = tempdir().unwrap();
        write_config(
            dir.path(),
            r#"
security:
  permission_cache_size: 250
  default_users:
    guest: Visitor
locks:
  persist_temporary: true
logging:
  level: debug
"#,
        );

        let config = ConfigLoader::new(dir.path()).load().unwrap();

        assert_eq!(config.security.permission_cache_size, 250);
        assert_eq!(config.security.default_users.guest, "Visitor");
        assert!(config.locks.persist_temporary);
        assert_eq!(config.logging.level, "debug");

        // Unspecified values keep their defaults
        assert_eq!(config.security.default_users.admin, "Admin");
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("PALISADE_TEST_VAR", "test_value");
        let loader = ConfigLoader::new(".");
        let result = loader.expand_env_vars("key: ${PALISADE_TEST_VAR}").unwrap();
        assert_eq!(result, "key: test_value");
        std::env::remove_var("PALISADE_TEST_VAR");
    }

    #[test]
    fn test_env_var_default() {
        let loader = ConfigLoader::new(".");
        let result = loader.expand_env_vars("key: ${PALISADE_NONEXISTENT:-default}").unwrap();
        assert_eq!(result, "key: default");
    }

    #[test]
    fn test_env_var_missing_error() {
        let loader = ConfigLoader::new(".");
        match loader.expand_env_vars("key: ${PALISADE_MISSING_VAR}") {
            Err(ConfigError::EnvVarNotFound { var }) => assert_eq!(var, "PALISADE_MISSING_VAR"),
            other => panic!("Expected EnvVarNotFound error, got {:?}", other),
        }
    }

    #[test]
    fn test_env_var_expansion_in_config() {
        std::env::set_var("PALISADE_TEST_STORE", "/var/lib/palisade/locks.json");
        let dir = tempdir().unwrap();
        write_config(
            dir.path(),
            r#"
security:
  permission_cache_size: ${PALISADE_TEST_CACHE:-64}
locks:
  store_path: ${PALISADE_TEST_STORE}
"#,
        );

        let config = ConfigLoader::new(dir.path()).load().unwrap();
        assert_eq!(config.security.permission_cache_size, 64);
        assert_eq!(config.locks.store_path, "/var/lib/palisade/locks.json");
        std::env::remove_var("PALISADE_TEST_STORE");
    }

    #[test]
    fn test_validation_errors() {
        let loader = ConfigLoader::new(".");

        let mut config = PalisadeConfig::default();
        config.security.permission_cache_size = 0;
        match loader.validate(&config) {
            Err(ConfigError::ValidationError { message }) => assert!(message.contains("permission_cache_size")),
            other => panic!("Expected ValidationError, got {:?}", other),
        }

        let mut config = PalisadeConfig::default();
        config.security.default_users.export = " ".to_string();
        match loader.validate(&config) {
            Err(ConfigError::ValidationError { message }) => assert!(message.contains("default_users.export")),
            other => panic!("Expected ValidationError, got {:?}", other),
        }

        let mut config = PalisadeConfig::default();
        config.locks.store_path = String::new();
        assert!(loader.validate(&config).is_err());

        let mut config = PalisadeConfig::default();
        config.logging.format = "xml".to_string();
        assert!(loader.validate(&config).is_err());
    }

    #[test]
    fn test_parse_error_with_line_number() {
        let dir = tempdir().unwrap();
        write_config(
            dir.path(),
            r#"
security:
  permission_cache_size: [unclosed
"#,
        );

        match ConfigLoader::new(dir.path()).load() {
            Err(ConfigError::ParseError { line, .. }) => assert!(line.is_some()),
            other => panic!("Expected ParseError with line number, got {:?}", other),
        }
    }

    #[test]
    fn test_save_config() {
        let dir = tempdir().unwrap();
        let loader = ConfigLoader::new(dir.path());

        let mut config = PalisadeConfig::default();
        config.security.permission_cache_size = 42;
        config.locks.store_path = "locks/state.json".to_string();

        loader.save(&config).unwrap();
        assert!(loader.config_path().exists());

        let loaded = loader.load().unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var(vars::PALISADE_LOCK_STORE, "/tmp/override.json");
        let loader = ConfigLoader::new(".");
        let mut config = PalisadeConfig::default();
        loader.apply_env_overrides(&mut config).unwrap();
        assert_eq!(config.locks.store_path, "/tmp/override.json");
        std::env::remove_var(vars::PALISADE_LOCK_STORE);
    }
}
