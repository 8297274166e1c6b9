//! Console adapter.
//!
//! Prints deliveries and reports to stdout. Used by the `simulate` command to
//! exercise the controller without a chat platform; faults can be injected on
//! chosen attempts to watch the loop react.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use async_trait::async_trait;
use super::{Delivery, Reporter};
use crate::commands::render_event;
use crate::error::DeliveryError;
use crate::types::{RunEvent, RunKey};

/// Delivery that writes each message to stdout.
#[derive(Debug, Default)]
pub struct ConsoleDelivery {
    attempts: AtomicUsize,
    faults: HashMap<usize, DeliveryError>,
}

impl ConsoleDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `attempt`-th delivery (1-based) with `error`.
    pub fn with_fault(mut self, attempt: usize, error: DeliveryError) -> Self {
        self.faults.insert(attempt, error);
        self
    }

    /// Deliveries attempted so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Delivery for ConsoleDelivery {
    fn name(&self) -> &str {
        "console"
    }

    async fn deliver(&self, destination_id: &str, message: &str) -> Result<(), DeliveryError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(error) = self.faults.get(&attempt) {
            tracing::debug!("Injecting fault on attempt {}: {}", attempt, error);
            return Err(error.clone());
        }

        println!("#{} {}", destination_id, message);
        Ok(())
    }
}

/// Reporter that prints the user-facing reply for each event.
#[derive(Debug, Default)]
pub struct ConsoleReporter;

#[async_trait]
impl Reporter for ConsoleReporter {
    async fn report(&self, key: &RunKey, event: RunEvent) {
        println!("@{} {}", key.initiator_id, render_event(&event));
    }
}
