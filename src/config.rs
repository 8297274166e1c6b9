//! Application configuration.
//!
//! One JSON file holds the controller timings, the Discord connection and the
//! logging setup. Every field has a default, so an empty object is a valid
//! config; the Discord token is usually supplied through the environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::channels::DiscordConfig;
use crate::controller::ControllerConfig;
use crate::error::ConfigError;

/// Expand tilde (~) in paths.
pub fn expand_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    if let Some(rest) = path_str.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Repeat-send timings and limits
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Discord connection settings
    #[serde(default)]
    pub discord: DiscordConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Enable JSON logging format
    #[serde(default)]
    pub json_format: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = expand_path(path.as_ref());

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        serde_json::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load the file if it exists, defaults otherwise.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::FileNotFound(path)) => {
                tracing::debug!("No config at {}, using defaults", path);
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Save configuration to a JSON file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = expand_path(path.as_ref());
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        }

        std::fs::write(&path, contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validate the configuration.
    ///
    /// The Discord section is only checked by the bot itself, so that the
    /// simulator works without a token.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.controller.validate()?;

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(ConfigError::InvalidValue {
                key: "logging.level".to_string(),
                reason: format!("Unknown log level '{}'", other),
            }),
        }
    }
}
