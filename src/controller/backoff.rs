//! Rate-limit retry budget.
//!
//! A throttled send is retried after the platform's suggested delay. The
//! budget caps both the consecutive retries of one send and the total time a
//! run spends waiting on throttling, so a platform that never lets up ends the
//! run instead of stalling it forever.

use std::time::Duration;
use super::config::ControllerConfig;

/// Tracks rate-limit waits for a single run.
#[derive(Debug, Clone)]
pub struct RateLimitBudget {
    max_consecutive: u32,
    max_total_wait: Duration,
    default_delay: Duration,
    consecutive: u32,
    retries: u32,
    total_wait: Duration,
}

impl RateLimitBudget {
    /// Create a budget with explicit limits.
    pub fn new(max_consecutive: u32, max_total_wait: Duration, default_delay: Duration) -> Self {
        Self {
            max_consecutive,
            max_total_wait,
            default_delay,
            consecutive: 0,
            retries: 0,
            total_wait: Duration::ZERO,
        }
    }

    /// Create a budget from controller settings.
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(
            config.max_rate_limit_retries,
            config.max_rate_limit_wait(),
            config.default_retry_after(),
        )
    }

    /// Account for a rate-limit signal.
    ///
    /// Returns the delay to wait before retrying the same send, or `None` when
    /// the budget is spent.
    pub fn admit(&mut self, retry_after: Option<Duration>) -> Option<Duration> {
        let delay = retry_after.unwrap_or(self.default_delay);

        if self.consecutive >= self.max_consecutive {
            return None;
        }
        if self.total_wait + delay > self.max_total_wait {
            return None;
        }

        self.consecutive += 1;
        self.retries += 1;
        self.total_wait += delay;
        Some(delay)
    }

    /// Reset the consecutive counter after a send went through.
    pub fn on_success(&mut self) {
        self.consecutive = 0;
    }

    /// Retries admitted over the whole run.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Time spent waiting on rate limits over the whole run.
    pub fn total_wait(&self) -> Duration {
        self.total_wait
    }
}
