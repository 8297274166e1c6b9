//! Error types for repeat-bot.
//!
//! This module defines all error types used throughout the system.

use std::time::Duration;
use thiserror::Error;
use crate::types::RunKey;

/// Main error type for repeat-bot operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Controller errors
    #[error("Controller error: {0}")]
    Controller(#[from] ControllerError),

    /// Delivery errors
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// Command errors
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Result type alias for repeat-bot.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the repeat-send controller when a request is rejected.
///
/// Both variants are raised before any run state exists, so the caller can
/// simply report them and move on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("A run is already active for {0}")]
    AlreadyRunning(RunKey),

    #[error("Run task failed: {0}")]
    TaskFailed(String),
}

/// Outcome classes of a failed delivery.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The platform throttled the request. `retry_after` is the suggested
    /// wait when the platform supplied one.
    #[error("Rate limited{}", describe_retry_after(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Delivery failed: {0}")]
    Other(String),
}

fn describe_retry_after(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(", retry after {}ms", d.as_millis()))
        .unwrap_or_default()
}

impl DeliveryError {
    /// Rate limit with a platform-suggested delay in milliseconds.
    pub fn rate_limited_ms(ms: u64) -> Self {
        DeliveryError::RateLimited {
            retry_after: Some(Duration::from_millis(ms)),
        }
    }
}

/// Errors raised while turning a slash command into a controller request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Missing option: {0}")]
    MissingOption(String),

    #[error("Invalid option '{name}': {reason}")]
    InvalidOption { name: String, reason: String },
}

/// Errors related to Configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid config value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Missing required config: {0}")]
    MissingRequired(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_display() {
        let err = DeliveryError::rate_limited_ms(1500);
        assert_eq!(err.to_string(), "Rate limited, retry after 1500ms");

        let err = DeliveryError::RateLimited { retry_after: None };
        assert_eq!(err.to_string(), "Rate limited");
    }

    #[test]
    fn test_controller_error_converts() {
        let err: Error = ControllerError::InvalidInput("count".to_string()).into();
        assert!(matches!(err, Error::Controller(ControllerError::InvalidInput(_))));
    }
}
