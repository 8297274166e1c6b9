//! Discord adapter for repeat-bot.
//!
//! Uses the serenity library to register the slash commands, route
//! interactions into the controller, post messages and answer the invoking
//! user with ephemeral replies.

#[cfg(feature = "discord")]
mod implementation;
mod config;

use std::time::Duration;
use crate::error::DeliveryError;

pub use config::DiscordConfig;

#[cfg(feature = "discord")]
pub use implementation::{delivery_http, DiscordBot, DiscordDelivery, InteractionReporter};

#[cfg(not(feature = "discord"))]
pub use stub::DiscordBot;

/// Missing Access
pub const MISSING_ACCESS: isize = 50001;

/// Missing Permissions
pub const MISSING_PERMISSIONS: isize = 50013;

/// Map a failed Discord API call to a delivery outcome.
///
/// `code` is the JSON error code from the response body, `retry_after` the
/// delay Discord suggested for a 429, when known.
pub fn classify_http_error(
    status: u16,
    code: Option<isize>,
    message: &str,
    retry_after: Option<Duration>,
) -> DeliveryError {
    if status == 429 {
        return DeliveryError::RateLimited { retry_after };
    }

    match code {
        Some(MISSING_ACCESS) | Some(MISSING_PERMISSIONS) => {
            DeliveryError::PermissionDenied(message.to_string())
        }
        _ if status == 403 => DeliveryError::PermissionDenied(message.to_string()),
        _ => DeliveryError::Other(format!("HTTP {}: {}", status, message)),
    }
}

/// Stub implementation when discord feature is disabled.
#[cfg(not(feature = "discord"))]
mod stub {
    use super::DiscordConfig;
    use crate::controller::ControllerConfig;
    use crate::error::{Error, Result};

    /// Stub DiscordBot when feature is disabled.
    pub struct DiscordBot {
        config: DiscordConfig,
    }

    impl DiscordBot {
        /// Create a new stub bot.
        pub fn new(config: DiscordConfig, _controller: ControllerConfig) -> Self {
            Self { config }
        }

        /// Always fails: there is no client to run.
        pub async fn run(self) -> Result<()> {
            tracing::warn!("Discord support not compiled in. Enable with --features discord");
            self.config.validate()?;
            Err(Error::Other(
                "Discord feature not enabled. Compile with --features discord".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rate_limit() {
        let err = classify_http_error(429, None, "You are being rate limited.", Some(Duration::from_millis(800)));
        assert_eq!(err, DeliveryError::rate_limited_ms(800));
    }

    #[test]
    fn test_classify_permission_codes() {
        assert_eq!(
            classify_http_error(403, Some(MISSING_ACCESS), "Missing Access", None),
            DeliveryError::PermissionDenied("Missing Access".to_string())
        );
        assert_eq!(
            classify_http_error(403, Some(MISSING_PERMISSIONS), "Missing Permissions", None),
            DeliveryError::PermissionDenied("Missing Permissions".to_string())
        );
        assert!(matches!(
            classify_http_error(403, Some(40001), "Unauthorized", None),
            DeliveryError::PermissionDenied(_)
        ));
    }

    #[test]
    fn test_classify_other() {
        assert_eq!(
            classify_http_error(404, Some(10003), "Unknown Channel", None),
            DeliveryError::Other("HTTP 404: Unknown Channel".to_string())
        );
    }

    #[cfg(not(feature = "discord"))]
    #[tokio::test]
    async fn test_stub_bot_refuses_to_run() {
        let bot = DiscordBot::new(DiscordConfig::new("token"), Default::default());
        assert!(bot.run().await.is_err());
    }
}
