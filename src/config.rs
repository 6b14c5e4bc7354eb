//! Configuration management for the paperframe server.
//!
//! Handles loading and validating the server configuration from a JSON
//! file. Display settings and mode configurations are not part of this
//! file; they live in the data directory (see [`crate::store`]).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "/opt/paperframe/config.json";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Web server port
    #[serde(default = "default_web_port")]
    pub web_port: u16,

    /// Directory holding settings.json, slideshow.json and feed.json
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Run without touching the GPIO/SPI/I2C hardware
    #[serde(default)]
    pub desktop: bool,

    /// Save every rendered frame as PNG into this directory
    #[serde(default)]
    pub debug_output_dir: Option<PathBuf>,

    /// Timeout for a single image feed request in seconds
    #[serde(default = "default_feed_timeout_secs")]
    pub feed_timeout_secs: u64,

    /// Enable verbose logging
    #[serde(default)]
    pub verbose: bool,
}

fn default_web_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/opt/paperframe/data")
}

fn default_feed_timeout_secs() -> u64 {
    30
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            web_port: default_web_port(),
            data_dir: default_data_dir(),
            desktop: false,
            debug_output_dir: None,
            feed_timeout_secs: default_feed_timeout_secs(),
            verbose: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.web_port == 0 {
            return Err(ConfigError::ValidationError(
                "web_port must be greater than 0".to_string(),
            ));
        }

        if self.feed_timeout_secs < 1 || self.feed_timeout_secs > 300 {
            return Err(ConfigError::ValidationError(
                "feed_timeout_secs must be between 1 and 300".to_string(),
            ));
        }

        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "data_dir cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn feed_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.feed_timeout_secs)
    }
}

/// Write a file using a write-to-temp-then-rename pattern
///
/// A power cut mid-write leaves either the old or the new file, never a
/// truncated one.
pub fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    std::fs::write(&tmp_path, content)?;

    std::fs::rename(&tmp_path, path).inspect_err(|_| {
        let _ = std::fs::remove_file(&tmp_path);
    })
}
