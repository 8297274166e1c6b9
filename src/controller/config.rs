//! Controller configuration.
//!
//! Timing and validation limits for the repeat-send loop. The defaults match
//! what Discord tolerates for a single bot posting into one channel.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use crate::error::ConfigError;

/// Configuration for the repeat-send controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Wait between two sends, in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Every `burst_size` successful sends the loop waits `burst_cooldown_ms`
    /// instead of the standard interval
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,

    /// Extended cooldown after a burst, in milliseconds
    #[serde(default = "default_burst_cooldown_ms")]
    pub burst_cooldown_ms: u64,

    /// Wait used when the platform rate-limits without saying for how long
    #[serde(default = "default_retry_after_ms")]
    pub default_retry_after_ms: u64,

    /// Maximum message length, in characters
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,

    /// Maximum number of sends per run
    #[serde(default = "default_max_count")]
    pub max_count: u32,

    /// Consecutive rate-limit retries allowed for a single send
    #[serde(default = "default_max_rate_limit_retries")]
    pub max_rate_limit_retries: u32,

    /// Total time a run may spend waiting on rate limits, in milliseconds
    #[serde(default = "default_max_rate_limit_wait_ms")]
    pub max_rate_limit_wait_ms: u64,
}

fn default_interval_ms() -> u64 {
    1200
}

fn default_burst_size() -> u32 {
    5
}

fn default_burst_cooldown_ms() -> u64 {
    2000
}

fn default_retry_after_ms() -> u64 {
    5000
}

fn default_max_message_len() -> usize {
    1500
}

fn default_max_count() -> u32 {
    50
}

fn default_max_rate_limit_retries() -> u32 {
    10
}

fn default_max_rate_limit_wait_ms() -> u64 {
    300_000 // 5 minutes
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            burst_size: default_burst_size(),
            burst_cooldown_ms: default_burst_cooldown_ms(),
            default_retry_after_ms: default_retry_after_ms(),
            max_message_len: default_max_message_len(),
            max_count: default_max_count(),
            max_rate_limit_retries: default_max_rate_limit_retries(),
            max_rate_limit_wait_ms: default_max_rate_limit_wait_ms(),
        }
    }
}

impl ControllerConfig {
    /// Create a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the standard interval between sends.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the burst size and the cooldown applied after each burst.
    pub fn with_burst(mut self, size: u32, cooldown: Duration) -> Self {
        self.burst_size = size;
        self.burst_cooldown_ms = cooldown.as_millis() as u64;
        self
    }

    /// Set the fallback wait for rate limits without a suggested delay.
    pub fn with_default_retry_after(mut self, delay: Duration) -> Self {
        self.default_retry_after_ms = delay.as_millis() as u64;
        self
    }

    /// Set the validation limits.
    pub fn with_limits(mut self, max_message_len: usize, max_count: u32) -> Self {
        self.max_message_len = max_message_len;
        self.max_count = max_count;
        self
    }

    /// Set the rate-limit retry budget.
    pub fn with_rate_limit_budget(mut self, max_retries: u32, max_wait: Duration) -> Self {
        self.max_rate_limit_retries = max_retries;
        self.max_rate_limit_wait_ms = max_wait.as_millis() as u64;
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn burst_cooldown(&self) -> Duration {
        Duration::from_millis(self.burst_cooldown_ms)
    }

    pub fn default_retry_after(&self) -> Duration {
        Duration::from_millis(self.default_retry_after_ms)
    }

    pub fn max_rate_limit_wait(&self) -> Duration {
        Duration::from_millis(self.max_rate_limit_wait_ms)
    }

    /// Rough time a run of `count` sends takes at the standard interval,
    /// rounded up to whole seconds.
    pub fn estimate(&self, count: u32) -> Duration {
        let total_ms = count as u64 * self.interval_ms;
        Duration::from_secs(total_ms.div_ceil(1000))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_count == 0 {
            return Err(ConfigError::InvalidValue {
                key: "controller.max_count".to_string(),
                reason: "Maximum count must be at least 1".to_string(),
            });
        }

        if self.max_message_len == 0 {
            return Err(ConfigError::InvalidValue {
                key: "controller.max_message_len".to_string(),
                reason: "Maximum message length must be at least 1".to_string(),
            });
        }

        if self.burst_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "controller.burst_size".to_string(),
                reason: "Burst size must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ControllerConfig::default();
        assert_eq!(config.interval(), Duration::from_millis(1200));
        assert_eq!(config.burst_size, 5);
        assert_eq!(config.max_count, 50);
        assert_eq!(config.max_message_len, 1500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_estimate_rounds_up() {
        let config = ControllerConfig::default();
        // 3 * 1.2s = 3.6s
        assert_eq!(config.estimate(3), Duration::from_secs(4));
        assert_eq!(config.estimate(50), Duration::from_secs(60));
    }

    #[test]
    fn test_config_validation() {
        let config = ControllerConfig::default().with_limits(1500, 0);
        assert!(config.validate().is_err());

        let config = ControllerConfig::default().with_burst(0, Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serde_defaults() {
        let config: ControllerConfig = serde_json::from_str(r#"{"interval_ms": 500}"#).unwrap();
        assert_eq!(config.interval_ms, 500);
        assert_eq!(config.burst_cooldown_ms, 2000);
        assert_eq!(config.max_rate_limit_retries, 10);
    }
}
