//! Configuration management for segue-player
//!
//! Two-tier configuration:
//! 1. **TOML bootstrap**: database path, port, logging (static; restart to
//!    change)
//! 2. **Database runtime**: tuning values from the `settings` table (see
//!    `db::settings`)
//!
//! Priority: command-line arguments > environment variables > TOML file >
//! built-in defaults.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Bootstrap configuration loaded from a TOML file.
///
/// These settings cannot change during runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Path to SQLite database file (relative or absolute)
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("segue.db")
}

fn default_port() -> u16 {
    5750
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            port: default_port(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Command-line configuration overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub database_path: Option<PathBuf>,
    pub port: Option<u16>,
}

/// Resolved service configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub port: u16,
    pub log_level: String,
}

impl Config {
    /// Resolve configuration from an optional TOML file plus CLI overrides.
    ///
    /// A missing `toml_path` means "no file": defaults apply. A present but
    /// unreadable or malformed file is an error.
    pub async fn load(toml_path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self> {
        let toml_config = match toml_path {
            Some(path) => {
                let toml_str = tokio::fs::read_to_string(path).await.map_err(|e| {
                    Error::Config(format!("Failed to read config file {:?}: {}", path, e))
                })?;
                toml::from_str::<TomlConfig>(&toml_str)
                    .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?
            }
            None => TomlConfig::default(),
        };

        Ok(Config {
            database_path: overrides
                .database_path
                .unwrap_or(toml_config.database_path),
            port: overrides.port.unwrap_or(toml_config.port),
            log_level: toml_config.logging.level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(default_port(), 5750);
        assert_eq!(default_database_path(), PathBuf::from("segue.db"));
        assert_eq!(default_log_level(), "info");
    }

    #[tokio::test]
    async fn test_load_without_file_uses_defaults() {
        let config = Config::load(None, ConfigOverrides::default()).await.unwrap();
        assert_eq!(config.port, 5750);
        assert_eq!(config.database_path, PathBuf::from("segue.db"));
    }

    #[tokio::test]
    async fn test_cli_overrides_win() {
        let overrides = ConfigOverrides {
            database_path: Some(PathBuf::from("/tmp/other.db")),
            port: Some(6000),
        };
        let config = Config::load(None, overrides).await.unwrap();
        assert_eq!(config.port, 6000);
        assert_eq!(config.database_path, PathBuf::from("/tmp/other.db"));
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let missing = Path::new("/nonexistent/segue.toml");
        let result = Config::load(Some(missing), ConfigOverrides::default()).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
