//! Configuration module
//!
//! Handles loading the farelink configuration: microservice endpoint,
//! database location for the handshake, and the training window. Values
//! come from a TOML file with optional environment-variable overrides,
//! and are handed to the client as one explicit struct — there is no
//! global configuration state.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::protocol::DEFAULT_PORT;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid value in environment variable {0}")]
    Env(&'static str),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Microservice endpoint settings
    #[serde(default)]
    pub microservice: MicroserviceConfig,

    /// Database location sent in the INIT handshake
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Training window sent in the INIT handshake
    #[serde(default)]
    pub training: TrainingConfig,
}

/// Where the modelling microservice lives and how long to wait for it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MicroserviceConfig {
    /// Host of the modelling microservice
    #[serde(default = "default_host")]
    pub host: String,
    /// Port of the modelling microservice
    #[serde(default = "default_port")]
    pub port: u16,
    /// TCP connect timeout in ms
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Per-request reply timeout in ms. The source protocol waits forever;
    /// this bound is a deliberate robustness deviation.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_read_timeout() -> u64 {
    10_000
}

impl Default for MicroserviceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout_ms: default_connect_timeout(),
            read_timeout_ms: default_read_timeout(),
        }
    }
}

/// Database the microservice pulls its training data from. These values
/// travel over the wire in the handshake; the client never opens a
/// database connection itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_name")]
    pub name: String,
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

fn default_db_name() -> String {
    "taxis_and_ubers".to_string()
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: default_db_name(),
            host: default_db_host(),
            port: default_db_port(),
            username: String::new(),
            password: String::new(),
        }
    }
}

/// Training window for the handshake, ISO dates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_window_start")]
    pub window_start: String,
    #[serde(default = "default_window_end")]
    pub window_end: String,
}

fn default_window_start() -> String {
    "2023-01-01".to_string()
}

fn default_window_end() -> String {
    "2024-01-01".to_string()
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            window_start: default_window_start(),
            window_end: default_window_end(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default locations
    pub fn load_default() -> ConfigResult<Self> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("farelink/config.toml")),
            Some(PathBuf::from("./farelink.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                return Self::load(path);
            }
        }

        // Return default config if no file found
        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply environment-variable overrides on top of the file values.
    /// Variable names follow the deployment environment's convention.
    pub fn overlay_env(&mut self) -> ConfigResult<()> {
        if let Ok(v) = std::env::var("MICROSERVICE_HOST") {
            self.microservice.host = v;
        }
        if let Ok(v) = std::env::var("MICROSERVICE_PORT") {
            self.microservice.port = v.parse().map_err(|_| ConfigError::Env("MICROSERVICE_PORT"))?;
        }
        if let Ok(v) = std::env::var("DB_NAME") {
            self.database.name = v;
        }
        if let Ok(v) = std::env::var("DB_HOST") {
            self.database.host = v;
        }
        if let Ok(v) = std::env::var("DB_PORT") {
            self.database.port = v.parse().map_err(|_| ConfigError::Env("DB_PORT"))?;
        }
        if let Ok(v) = std::env::var("DB_USERNAME") {
            self.database.username = v;
        }
        if let Ok(v) = std::env::var("DB_PASSWORD") {
            self.database.password = v;
        }
        if let Ok(v) = std::env::var("TRAINING_START") {
            self.training.window_start = v;
        }
        if let Ok(v) = std::env::var("TRAINING_END") {
            self.training.window_end = v;
        }
        Ok(())
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config() -> String {
    let config = Config {
        microservice: MicroserviceConfig {
            host: "modelling.internal".to_string(),
            ..Default::default()
        },
        database: DatabaseConfig {
            username: "haekim".to_string(),
            password: "change-me".to_string(),
            ..Default::default()
        },
        ..Default::default()
    };

    toml::to_string_pretty(&config).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.microservice.port, DEFAULT_PORT);
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.training.window_start, "2023-01-01");
    }

    #[test]
    fn test_save_and_load() {
        let config = Config::default();
        let file = NamedTempFile::new().unwrap();

        config.save(file.path()).unwrap();

        let loaded = Config::load(file.path()).unwrap();
        assert_eq!(loaded.microservice.port, config.microservice.port);
        assert_eq!(loaded.database.name, config.database.name);
    }

    #[test]
    fn test_sample_config() {
        let sample = generate_sample_config();
        let parsed: Config = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.microservice.host, "modelling.internal");
        assert_eq!(parsed.database.username, "haekim");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: Config = toml::from_str("[microservice]\nport = 9000\n").unwrap();
        assert_eq!(parsed.microservice.port, 9000);
        assert_eq!(parsed.microservice.host, "127.0.0.1");
        assert_eq!(parsed.database.port, 5432);
    }

    #[test]
    fn test_overlay_env() {
        let mut config = Config::default();

        std::env::set_var("MICROSERVICE_HOST", "models.test");
        std::env::set_var("MICROSERVICE_PORT", "7171");
        std::env::set_var("DB_PASSWORD", "hunter2");

        let result = config.overlay_env();

        std::env::remove_var("MICROSERVICE_HOST");
        std::env::remove_var("MICROSERVICE_PORT");
        std::env::remove_var("DB_PASSWORD");

        result.unwrap();
        assert_eq!(config.microservice.host, "models.test");
        assert_eq!(config.microservice.port, 7171);
        assert_eq!(config.database.password, "hunter2");
    }

    #[test]
    fn test_overlay_env_bad_port() {
        let mut config = Config::default();

        std::env::set_var("DB_PORT", "not-a-port");
        let result = config.overlay_env();
        std::env::remove_var("DB_PORT");

        assert!(matches!(result, Err(ConfigError::Env("DB_PORT"))));
    }
}
