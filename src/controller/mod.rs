//! Repeat-send controller.
//!
//! The controller owns the [`RunRegistry`] and spawns one task per run. Each
//! task posts the run's message up to its target count, pausing between sends,
//! and stops early when the run is cancelled or delivery fails.
//!
//! ```text
//! start ──▶ validate ──▶ registry.try_register ──▶ spawn(SendLoop)
//!                                                     │
//!            ┌────────────────────────────────────────┘
//!            ▼
//!   ┌─ cancelled? ──yes──▶ exit
//!   │      │ no
//!   │   deliver ──ok──────────▶ pause (interval | burst cooldown)
//!   │      ├──rate limited───▶ pause (retry_after), same attempt again
//!   │      ├──permission─────▶ notify, exit
//!   │      └──other──────────▶ notify on first attempt, exit
//!   └──────┘
//! ```
//!
//! Cancellation is cooperative. A send already in flight always completes;
//! pauses are raced against the run's cancellation token so a stop request
//! takes effect as soon as the current send returns.

pub mod backoff;
pub mod config;
pub mod registry;

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::channels::{Delivery, Reporter};
use crate::error::{ConfigError, ControllerError, DeliveryError};
use crate::types::{RunEvent, RunExit, RunKey, RunReport, StartRequest, StopResult};

pub use backoff::RateLimitBudget;
pub use config::ControllerConfig;
pub use registry::{RunProgress, RunRegistry};

use registry::{Registration, RunGuard};

/// Starts and stops repeat-send runs.
pub struct RepeatController {
    config: ControllerConfig,
    registry: RunRegistry,
    delivery: Arc<dyn Delivery>,
    tasks: TaskTracker,
}

impl RepeatController {
    /// Create a controller with a fresh registry.
    pub fn new(config: ControllerConfig, delivery: Arc<dyn Delivery>) -> Result<Self, ConfigError> {
        Self::with_registry(config, RunRegistry::new(), delivery)
    }

    /// Create a controller over an existing registry.
    ///
    /// Fails if `config` does not validate.
    pub fn with_registry(
        config: ControllerConfig,
        registry: RunRegistry,
        delivery: Arc<dyn Delivery>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            registry,
            delivery,
            tasks: TaskTracker::new(),
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    /// Check a message and count against the configured limits.
    pub fn validate(&self, message: &str, count: u32) -> Result<(), ControllerError> {
        if message.trim().is_empty() {
            return Err(ControllerError::InvalidInput(
                "message must not be empty".to_string(),
            ));
        }

        let len = message.chars().count();
        if len > self.config.max_message_len {
            return Err(ControllerError::InvalidInput(format!(
                "message is {} characters, the limit is {}",
                len, self.config.max_message_len
            )));
        }

        if count == 0 || count > self.config.max_count {
            return Err(ControllerError::InvalidInput(format!(
                "count must be between 1 and {}",
                self.config.max_count
            )));
        }

        Ok(())
    }

    /// Register a run and start its loop in the background.
    ///
    /// Must be called from within a tokio runtime. `reporter` receives every
    /// event of this run, starting with [`RunEvent::Started`].
    pub fn start(
        &self,
        request: StartRequest,
        reporter: Arc<dyn Reporter>,
    ) -> Result<RunHandle, ControllerError> {
        self.validate(&request.message, request.count)?;

        let Registration {
            run_id,
            token,
            progress,
        } = self
            .registry
            .try_register(&request.key, &request.message, request.count)?;

        tracing::info!(
            "Starting run {} for {}: {} sends via {}",
            run_id,
            request.key,
            request.count,
            self.delivery.name()
        );

        // Owned by the task's future from here on, so the key is released
        // even if the task is dropped before it first runs.
        let guard = RunGuard::new(self.registry.clone(), request.key.clone(), run_id);
        let span = tracing::info_span!("run", id = run_id, key = %request.key);
        let send_loop = SendLoop {
            key: request.key.clone(),
            run_id,
            message: request.message,
            config: self.config.clone(),
            registry: self.registry.clone(),
            delivery: Arc::clone(&self.delivery),
            reporter,
            token: token.clone(),
            progress: Arc::clone(&progress),
        };
        let task = self.tasks.spawn(send_loop.run(guard).instrument(span));

        Ok(RunHandle {
            key: request.key,
            run_id,
            token,
            progress,
            task,
        })
    }

    /// Stop one run, or every run of `initiator_id` when no destination is
    /// given.
    ///
    /// Stopped runs are unregistered immediately; their loops exit once the
    /// send in flight, if any, returns.
    pub fn stop(&self, initiator_id: &str, destination_id: Option<&str>) -> StopResult {
        let stopped = match destination_id {
            Some(destination_id) => {
                let key = RunKey::new(initiator_id, destination_id);
                if self.registry.cancel(&key) {
                    vec![key]
                } else {
                    Vec::new()
                }
            }
            None => self.registry.cancel_all(initiator_id),
        };

        if stopped.is_empty() {
            tracing::debug!("Stop requested by {} but nothing is running", initiator_id);
            StopResult::NothingToStop
        } else {
            tracing::info!("Stopped {} run(s) for {}", stopped.len(), initiator_id);
            StopResult::Stopped(stopped)
        }
    }

    /// Stop every run and wait for their loops to report and exit.
    ///
    /// Runs started while this is waiting are waited for as well.
    pub async fn shutdown(&self) -> Vec<RunKey> {
        let stopped = self.registry.cancel_every_run();
        if !stopped.is_empty() {
            tracing::info!("Stopping {} run(s) for shutdown", stopped.len());
        }
        self.tasks.close();
        self.tasks.wait().await;
        stopped
    }
}

/// Handle to a started run.
#[derive(Debug)]
pub struct RunHandle {
    key: RunKey,
    run_id: u64,
    token: CancellationToken,
    progress: Arc<RunProgress>,
    task: JoinHandle<RunReport>,
}

impl RunHandle {
    pub fn key(&self) -> &RunKey {
        &self.key
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Successful sends so far.
    pub fn sent(&self) -> u32 {
        self.progress.sent()
    }

    /// Whether the run's loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Request cancellation without going through the registry.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for the run to end and return its report.
    pub async fn join(self) -> Result<RunReport, ControllerError> {
        self.task
            .await
            .map_err(|e| ControllerError::TaskFailed(e.to_string()))
    }
}

/// The loop driving one run.
struct SendLoop {
    key: RunKey,
    run_id: u64,
    message: String,
    config: ControllerConfig,
    registry: RunRegistry,
    delivery: Arc<dyn Delivery>,
    reporter: Arc<dyn Reporter>,
    token: CancellationToken,
    progress: Arc<RunProgress>,
}

impl SendLoop {
    async fn run(self, guard: RunGuard) -> RunReport {
        let target = self.progress.target();

        self.reporter
            .report(
                &self.key,
                RunEvent::Started {
                    target,
                    estimated: self.config.estimate(target),
                },
            )
            .await;

        let mut budget = RateLimitBudget::from_config(&self.config);
        let exit = self.drive(&mut budget).await;

        // Unregister before the final report so the key is free by the time
        // the initiator hears the run is over.
        drop(guard);

        let report = RunReport {
            key: self.key.clone(),
            sent: self.progress.sent(),
            target,
            exit,
            rate_limit_retries: budget.retries(),
        };
        tracing::info!(
            "Run finished: {}/{} sent ({:?})",
            report.sent,
            report.target,
            report.exit
        );

        self.reporter
            .report(&self.key, RunEvent::Finished(report.clone()))
            .await;
        report
    }

    async fn drive(&self, budget: &mut RateLimitBudget) -> RunExit {
        let target = self.progress.target();
        let mut index = 0;

        while index < target {
            if self.token.is_cancelled() || !self.registry.is_active(&self.key, self.run_id) {
                return RunExit::Cancelled;
            }

            match self
                .delivery
                .deliver(&self.key.destination_id, &self.message)
                .await
            {
                Ok(()) => {
                    budget.on_success();
                    let sent = self.progress.record_sent();
                    tracing::debug!("Sent {}/{}", sent, target);

                    index += 1;
                    if index == target {
                        break;
                    }

                    let wait = if sent % self.config.burst_size == 0 {
                        self.config.burst_cooldown()
                    } else {
                        self.config.interval()
                    };
                    if !self.pause(wait).await {
                        return RunExit::Cancelled;
                    }
                }
                Err(DeliveryError::RateLimited { retry_after }) => match budget.admit(retry_after) {
                    Some(delay) => {
                        tracing::warn!(
                            "Rate limited on send {}/{}, retrying in {:?}",
                            index + 1,
                            target,
                            delay
                        );
                        if !self.pause(delay).await {
                            return RunExit::Cancelled;
                        }
                    }
                    None => {
                        tracing::warn!(
                            "Rate limit budget spent after {} retries ({:?} waited)",
                            budget.retries(),
                            budget.total_wait()
                        );
                        self.reporter
                            .report(
                                &self.key,
                                RunEvent::DeliveryFailed {
                                    reason: "rate limited for too long".to_string(),
                                },
                            )
                            .await;
                        return RunExit::RateLimitExhausted;
                    }
                },
                Err(DeliveryError::PermissionDenied(reason)) => {
                    tracing::warn!("Permission denied on send {}/{}: {}", index + 1, target, reason);
                    self.reporter
                        .report(
                            &self.key,
                            RunEvent::PermissionDenied {
                                reason: reason.clone(),
                            },
                        )
                        .await;
                    return RunExit::PermissionDenied(reason);
                }
                Err(DeliveryError::Other(reason)) => {
                    tracing::error!("Send {}/{} failed: {}", index + 1, target, reason);
                    if index == 0 {
                        self.reporter
                            .report(
                                &self.key,
                                RunEvent::DeliveryFailed {
                                    reason: reason.clone(),
                                },
                            )
                            .await;
                    }
                    return RunExit::Failed(reason);
                }
            }
        }

        RunExit::Completed
    }

    /// Sleep for `wait` unless the run is cancelled first.
    ///
    /// Returns `false` when cancelled.
    async fn pause(&self, wait: Duration) -> bool {
        tokio::select! {
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(wait) => true,
        }
    }
}
