//! # repeat-bot
//!
//! Chat bot that repeats a message into a channel.
//!
//! ## Overview
//!
//! A user invokes `/spam` with a message and a count; the bot posts the
//! message that many times at a steady pace until the count is reached, the
//! user runs `/spam-stop`, or the platform refuses delivery.
//!
//! ## Core Concepts
//!
//! - **Runs**: one in-flight repeat per (user, channel), tracked in a shared registry
//! - **Cooperative stop**: a cancellation token checked before every send
//! - **Rate-limit backoff**: throttled sends are retried after the suggested delay
//! - **Adapters**: delivery and reporting are traits the chat platform implements
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use repeat_bot::channels::{ConsoleDelivery, ConsoleReporter};
//! use repeat_bot::{ControllerConfig, RepeatController, RunKey, StartRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let controller = RepeatController::new(
//!         ControllerConfig::default(),
//!         Arc::new(ConsoleDelivery::new()),
//!     )?;
//!     let request = StartRequest::new(RunKey::new("me", "general"), "hello", 3);
//!     let report = controller.start(request, Arc::new(ConsoleReporter))?.join().await?;
//!     println!("sent {}", report.sent);
//!     Ok(())
//! }
//! ```

pub mod types;
pub mod error;
pub mod controller;
pub mod channels;
pub mod commands;
pub mod config;

// Re-export commonly used types
pub use types::{
    RunKey,
    RunEvent,
    RunExit,
    RunReport,
    StartRequest,
    StopResult,
};
pub use error::{Error, Result};
pub use controller::{ControllerConfig, RepeatController, RunHandle, RunRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
