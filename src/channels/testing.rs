//! In-memory adapters for exercising the controller without a platform.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use async_trait::async_trait;
use tokio::sync::mpsc;
use super::{Delivery, Reporter};
use crate::error::DeliveryError;
use crate::types::{RunEvent, RunKey, RunReport};

/// A delivered message: destination and content.
pub type Delivered = (String, String);

/// Delivery that plays back a script of outcomes.
///
/// Each call consumes the next scripted outcome; once the script runs out
/// every call succeeds.
#[derive(Debug, Default)]
pub struct ScriptedDelivery {
    script: Mutex<VecDeque<Result<(), DeliveryError>>>,
    delivered: Mutex<Vec<Delivered>>,
    attempts: AtomicUsize,
    latency: Duration,
    subscriber: Mutex<Option<mpsc::UnboundedSender<Delivered>>>,
}

impl ScriptedDelivery {
    /// Create a delivery where every call succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Play back `outcomes` in order before falling back to success.
    pub fn with_script(outcomes: Vec<Result<(), DeliveryError>>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            ..Default::default()
        }
    }

    /// Make each call take `latency` before resolving.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Receive every successful delivery as it happens.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Delivered> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.subscriber.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
        rx
    }

    /// Successful deliveries so far.
    pub fn delivered(&self) -> Vec<Delivered> {
        self.delivered.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Calls made so far, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Delivery for ScriptedDelivery {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn deliver(&self, destination_id: &str, message: &str) -> Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let outcome = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or(Ok(()));

        if outcome.is_ok() {
            let item = (destination_id.to_string(), message.to_string());
            self.delivered
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(item.clone());
            if let Some(tx) = self.subscriber.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
                let _ = tx.send(item);
            }
        }
        outcome
    }
}

/// Reporter that keeps every event it receives.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<(RunKey, RunEvent)>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far, in order.
    pub fn events(&self) -> Vec<RunEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, event)| event.clone())
            .collect()
    }

    /// The final report, once the run has finished.
    pub fn finished(&self) -> Option<RunReport> {
        self.events().into_iter().find_map(|event| match event {
            RunEvent::Finished(report) => Some(report),
            _ => None,
        })
    }

    /// Number of error notifications (permission or generic failure).
    pub fn error_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| {
                matches!(
                    event,
                    RunEvent::PermissionDenied { .. } | RunEvent::DeliveryFailed { .. }
                )
            })
            .count()
    }
}

#[async_trait]
impl Reporter for RecordingReporter {
    async fn report(&self, key: &RunKey, event: RunEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((key.clone(), event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_then_success() {
        let delivery = ScriptedDelivery::with_script(vec![Err(DeliveryError::Other("boom".into()))]);

        assert!(delivery.deliver("c1", "a").await.is_err());
        assert!(delivery.deliver("c1", "b").await.is_ok());
        assert_eq!(delivery.attempts(), 2);
        assert_eq!(delivery.delivered(), vec![("c1".to_string(), "b".to_string())]);
    }

    #[tokio::test]
    async fn test_subscriber_sees_deliveries() {
        let delivery = ScriptedDelivery::new();
        let mut rx = delivery.subscribe();

        delivery.deliver("c1", "hello").await.unwrap();
        assert_eq!(rx.recv().await, Some(("c1".to_string(), "hello".to_string())));
    }
}
