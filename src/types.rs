//! Core types for repeat-bot.
//!
//! These types describe runs of the repeat-send loop and the events a run
//! reports back to whoever started it.

use std::fmt;
use std::time::Duration;
use serde::{Deserialize, Serialize};

/// Identifies one run: the user who started it and where it posts.
///
/// At most one run exists per key at any time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunKey {
    /// User who started the run
    pub initiator_id: String,
    /// Channel (or DM thread) that receives the messages
    pub destination_id: String,
}

impl RunKey {
    /// Create a new run key.
    pub fn new(initiator_id: impl Into<String>, destination_id: impl Into<String>) -> Self {
        Self {
            initiator_id: initiator_id.into(),
            destination_id: destination_id.into(),
        }
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.initiator_id, self.destination_id)
    }
}

/// A request to start repeating a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    pub key: RunKey,
    pub message: String,
    pub count: u32,
}

impl StartRequest {
    /// Create a new start request.
    pub fn new(key: RunKey, message: impl Into<String>, count: u32) -> Self {
        Self {
            key,
            message: message.into(),
            count,
        }
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum RunExit {
    /// Every requested message was delivered.
    Completed,
    /// A stop request was observed before the run finished.
    Cancelled,
    /// The platform refused delivery for lack of access.
    PermissionDenied(String),
    /// Delivery failed for an unclassified reason.
    Failed(String),
    /// The platform kept throttling past the configured retry budget.
    RateLimitExhausted,
}

impl RunExit {
    /// Whether the run ended because of a delivery problem.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            RunExit::PermissionDenied(_) | RunExit::Failed(_) | RunExit::RateLimitExhausted
        )
    }
}

/// Final summary of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub key: RunKey,
    /// Successful deliveries
    pub sent: u32,
    /// Requested deliveries
    pub target: u32,
    /// How the run ended
    pub exit: RunExit,
    /// Rate-limit retries performed along the way
    pub rate_limit_retries: u32,
}

/// Progress events a run reports to its initiator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    /// The run was registered and its loop is about to begin.
    Started {
        target: u32,
        /// Rough duration of the whole run at the standard interval
        estimated: Duration,
    },
    /// Delivery was refused for lack of permission; the run is aborting.
    PermissionDenied { reason: String },
    /// Delivery failed on the first attempt; the run is aborting.
    DeliveryFailed { reason: String },
    /// The run has been unregistered.
    Finished(RunReport),
}

/// Result of a stop request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopResult {
    /// No matching run was active.
    NothingToStop,
    /// These runs were cancelled.
    Stopped(Vec<RunKey>),
}

impl StopResult {
    /// Number of runs cancelled by the request.
    pub fn stopped_count(&self) -> usize {
        match self {
            StopResult::NothingToStop => 0,
            StopResult::Stopped(keys) => keys.len(),
        }
    }
}

/// Point-in-time view of an active run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSnapshot {
    pub key: RunKey,
    pub run_id: u64,
    pub sent: u32,
    pub target: u32,
    pub message: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_key_display() {
        let key = RunKey::new("u1", "c1");
        assert_eq!(key.to_string(), "u1@c1");
    }

    #[test]
    fn test_run_exit_failure_classes() {
        assert!(!RunExit::Completed.is_failure());
        assert!(!RunExit::Cancelled.is_failure());
        assert!(RunExit::PermissionDenied("x".into()).is_failure());
        assert!(RunExit::RateLimitExhausted.is_failure());
    }

    #[test]
    fn test_run_exit_serde() {
        let json = serde_json::to_string(&RunExit::Failed("boom".into())).unwrap();
        assert_eq!(json, r#"{"kind":"failed","reason":"boom"}"#);
    }

    #[test]
    fn test_stop_result_count() {
        assert_eq!(StopResult::NothingToStop.stopped_count(), 0);
        let stopped = StopResult::Stopped(vec![RunKey::new("u", "a"), RunKey::new("u", "b")]);
        assert_eq!(stopped.stopped_count(), 2);
    }
}
