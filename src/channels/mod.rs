//! Channel adapters for repeat-bot.
//!
//! The controller talks to a chat platform through two narrow capabilities:
//!
//! - [`Delivery`] posts one message to a destination and classifies failures.
//! - [`Reporter`] relays a run's progress back to the user who started it.
//!
//! How an adapter reaches the destination (direct channel send, webhook,
//! interaction follow-up) is its own business; the controller only sees the
//! tagged [`DeliveryError`].
//!
//! ## Adapters
//!
//! | Adapter  | Feature Flag | Delivery             | Reporter               |
//! |----------|--------------|----------------------|------------------------|
//! | Discord  | `discord`    | `DiscordDelivery`    | `InteractionReporter`  |
//! | Console  | -            | `ConsoleDelivery`    | `ConsoleReporter`      |

use async_trait::async_trait;
use crate::error::DeliveryError;
use crate::types::{RunEvent, RunKey};

// Submodules
pub mod console;
pub mod discord;
pub mod testing;

// Re-export commonly used types
pub use console::{ConsoleDelivery, ConsoleReporter};
pub use discord::{DiscordBot, DiscordConfig};

/// Posts messages to a destination on behalf of a run.
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Get the adapter identifier (e.g., "discord", "console").
    fn name(&self) -> &str;

    /// Deliver `message` to `destination_id`.
    ///
    /// Must resolve only once the platform has acknowledged or refused the
    /// message; the controller never issues the next send before this returns.
    async fn deliver(&self, destination_id: &str, message: &str) -> Result<(), DeliveryError>;
}

/// Relays run events to the run's initiator.
#[async_trait]
pub trait Reporter: Send + Sync {
    /// Report one event. Failures to report are the reporter's to log; they
    /// never affect the run.
    async fn report(&self, key: &RunKey, event: RunEvent);
}
