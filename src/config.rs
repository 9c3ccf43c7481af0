//! Configuration module for classdrop.

use serde::Deserialize;
use std::path::Path;

use crate::{ClassdropError, Result};

/// Backend connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Connection URL of the document store.
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Base directory of the blob store.
    #[serde(default = "default_storage_path")]
    pub storage_path: String,
    /// Public base URL under which stored blobs are served.
    ///
    /// When unset, retrieval URLs are `file://` URLs into `storage_path`.
    #[serde(default)]
    pub public_url: Option<String>,
}

fn default_database_url() -> String {
    "sqlite://data/classdrop.db".to_string()
}

fn default_storage_path() -> String {
    "data/blobs".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            storage_path: default_storage_path(),
            public_url: None,
        }
    }
}

/// Class record configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassesConfig {
    /// How many generated codes are checked for collisions before giving up.
    #[serde(default = "default_code_retry_limit")]
    pub code_retry_limit: usize,
}

fn default_code_retry_limit() -> usize {
    3
}

impl Default for ClassesConfig {
    fn default() -> Self {
        Self {
            code_retry_limit: default_code_retry_limit(),
        }
    }
}

/// Display configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    /// Timezone for displaying dates (e.g., "Europe/London", "UTC").
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/classdrop.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Backend configuration.
    #[serde(default)]
    pub backend: BackendConfig,
    /// Class record configuration.
    #[serde(default)]
    pub classes: ClassesConfig,
    /// Display configuration.
    #[serde(default)]
    pub display: DisplayConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ClassdropError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| ClassdropError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `CLASSDROP_DATABASE_URL`: Override the document store URL
    /// - `CLASSDROP_STORAGE_PATH`: Override the blob store directory
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("CLASSDROP_DATABASE_URL") {
            if !url.is_empty() {
                self.backend.database_url = url;
            }
        }
        if let Ok(path) = std::env::var("CLASSDROP_STORAGE_PATH") {
            if !path.is_empty() {
                self.backend.storage_path = path;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.classes.code_retry_limit == 0 {
            return Err(ClassdropError::Config(
                "classes.code_retry_limit must be at least 1".to_string(),
            ));
        }
        if self.display.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(ClassdropError::Config(format!(
                "unknown timezone: {}",
                self.display.timezone
            )));
        }
        if let Some(ref public_url) = self.backend.public_url {
            url::Url::parse(public_url)
                .map_err(|e| ClassdropError::Config(format!("invalid public_url: {e}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.backend.database_url, "sqlite://data/classdrop.db");
        assert_eq!(config.backend.storage_path, "data/blobs");
        assert!(config.backend.public_url.is_none());

        assert_eq!(config.classes.code_retry_limit, 3);

        assert_eq!(config.display.timezone, "UTC");

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.file, "logs/classdrop.log");
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[backend]
database_url = "sqlite://custom/db.sqlite"
storage_path = "custom/blobs"
public_url = "https://files.example.com/blobs/"

[classes]
code_retry_limit = 5

[display]
timezone = "Asia/Tokyo"

[logging]
level = "debug"
file = "custom/logs/app.log"
"#;

        let config = Config::parse(toml).unwrap();

        assert_eq!(config.backend.database_url, "sqlite://custom/db.sqlite");
        assert_eq!(config.backend.storage_path, "custom/blobs");
        assert_eq!(
            config.backend.public_url.as_deref(),
            Some("https://files.example.com/blobs/")
        );
        assert_eq!(config.classes.code_retry_limit, 5);
        assert_eq!(config.display.timezone, "Asia/Tokyo");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.file, "custom/logs/app.log");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
[classes]
code_retry_limit = 7
"#;

        let config = Config::parse(toml).unwrap();

        assert_eq!(config.classes.code_retry_limit, 7);
        assert_eq!(config.backend.storage_path, "data/blobs");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_invalid_config() {
        let result = Config::parse("this is not valid toml [[[");

        if let Err(ClassdropError::Config(msg)) = result {
            assert!(msg.contains("config parse error"));
        } else {
            panic!("Expected Config error");
        }
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load("nonexistent.toml");
        assert!(matches!(result, Err(ClassdropError::Io(_))));
    }

    #[test]
    fn test_validate_zero_retry_limit() {
        let mut config = Config::default();
        config.classes.code_retry_limit = 0;

        let result = config.validate();
        if let Err(ClassdropError::Config(msg)) = result {
            assert!(msg.contains("code_retry_limit"));
        } else {
            panic!("Expected Config error");
        }
    }

    #[test]
    fn test_validate_unknown_timezone() {
        let mut config = Config::default();
        config.display.timezone = "Mars/Olympus".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bad_public_url() {
        let mut config = Config::default();
        config.backend.public_url = Some("not a url".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_apply_env_overrides_storage_path() {
        let original = std::env::var("CLASSDROP_STORAGE_PATH").ok();

        std::env::set_var("CLASSDROP_STORAGE_PATH", "/srv/blobs");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.backend.storage_path, "/srv/blobs");

        std::env::set_var("CLASSDROP_STORAGE_PATH", "");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.backend.storage_path, "data/blobs");

        if let Some(val) = original {
            std::env::set_var("CLASSDROP_STORAGE_PATH", val);
        } else {
            std::env::remove_var("CLASSDROP_STORAGE_PATH");
        }
    }
}
