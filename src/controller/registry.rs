//! Registry of active runs.
//!
//! The registry is the only state shared between runs. It is indexed by
//! initiator, then destination, so that "stop everything I started" is a
//! single map removal. Every operation takes the lock once and never holds it
//! across an await point.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use crate::error::ControllerError;
use crate::types::{RunKey, RunSnapshot};

type RunMap = HashMap<String, HashMap<String, RunEntry>>;

/// Shared, cloneable registry of active runs.
#[derive(Debug, Clone, Default)]
pub struct RunRegistry {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    runs: Mutex<RunMap>,
    next_id: AtomicU64,
}

#[derive(Debug)]
struct RunEntry {
    id: u64,
    token: CancellationToken,
    progress: Arc<RunProgress>,
    message: String,
    started_at: chrono::DateTime<chrono::Utc>,
}

/// Send counter of one run, shared between the loop and the registry.
#[derive(Debug)]
pub struct RunProgress {
    sent: AtomicU32,
    target: u32,
}

impl RunProgress {
    fn new(target: u32) -> Self {
        Self {
            sent: AtomicU32::new(0),
            target,
        }
    }

    /// Successful sends so far.
    pub fn sent(&self) -> u32 {
        self.sent.load(Ordering::SeqCst)
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    /// Count one successful send and return the new total.
    pub(crate) fn record_sent(&self) -> u32 {
        let sent = self.sent.fetch_add(1, Ordering::SeqCst) + 1;
        debug_assert!(sent <= self.target, "sent count exceeded target");
        sent
    }
}

/// What a successful registration hands to the run's loop.
#[derive(Debug)]
pub struct Registration {
    pub run_id: u64,
    pub token: CancellationToken,
    pub progress: Arc<RunProgress>,
}

impl RunRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RunMap> {
        // The map stays consistent even if a holder panicked: every mutation
        // is a single insert or remove.
        self.inner.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a run for `key` unless one is already active.
    pub fn try_register(
        &self,
        key: &RunKey,
        message: &str,
        target: u32,
    ) -> Result<Registration, ControllerError> {
        let mut runs = self.lock();
        let by_destination = runs.entry(key.initiator_id.clone()).or_default();

        if by_destination.contains_key(&key.destination_id) {
            return Err(ControllerError::AlreadyRunning(key.clone()));
        }

        let run_id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();
        let progress = Arc::new(RunProgress::new(target));

        by_destination.insert(
            key.destination_id.clone(),
            RunEntry {
                id: run_id,
                token: token.clone(),
                progress: Arc::clone(&progress),
                message: message.to_string(),
                started_at: chrono::Utc::now(),
            },
        );

        Ok(Registration {
            run_id,
            token,
            progress,
        })
    }

    /// Whether the run `run_id` is still the one registered under `key`.
    pub fn is_active(&self, key: &RunKey, run_id: u64) -> bool {
        self.lock()
            .get(&key.initiator_id)
            .and_then(|m| m.get(&key.destination_id))
            .is_some_and(|entry| entry.id == run_id)
    }

    /// Cancel and unregister the run under `key`.
    ///
    /// Returns `false` if nothing was registered.
    pub fn cancel(&self, key: &RunKey) -> bool {
        let mut runs = self.lock();
        let Some(by_destination) = runs.get_mut(&key.initiator_id) else {
            return false;
        };

        let removed = by_destination.remove(&key.destination_id);
        if by_destination.is_empty() {
            runs.remove(&key.initiator_id);
        }

        match removed {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel and unregister every run started by `initiator_id`.
    pub fn cancel_all(&self, initiator_id: &str) -> Vec<RunKey> {
        let Some(by_destination) = self.lock().remove(initiator_id) else {
            return Vec::new();
        };

        let mut keys: Vec<RunKey> = by_destination
            .into_iter()
            .map(|(destination_id, entry)| {
                entry.token.cancel();
                RunKey::new(initiator_id, destination_id)
            })
            .collect();
        keys.sort_by(|a, b| a.destination_id.cmp(&b.destination_id));
        keys
    }

    /// Cancel and unregister every run of every initiator.
    pub fn cancel_every_run(&self) -> Vec<RunKey> {
        let runs = std::mem::take(&mut *self.lock());

        let mut keys: Vec<RunKey> = runs
            .into_iter()
            .flat_map(|(initiator_id, by_destination)| {
                by_destination.into_iter().map(move |(destination_id, entry)| {
                    entry.token.cancel();
                    RunKey::new(initiator_id.clone(), destination_id)
                })
            })
            .collect();
        keys.sort_by(|a, b| {
            (&a.initiator_id, &a.destination_id).cmp(&(&b.initiator_id, &b.destination_id))
        });
        keys
    }

    /// Unregister `key` if it still belongs to `run_id`.
    ///
    /// A run that was stopped and replaced by a newer one under the same key
    /// must not remove its successor.
    pub fn release(&self, key: &RunKey, run_id: u64) -> bool {
        let mut runs = self.lock();
        let Some(by_destination) = runs.get_mut(&key.initiator_id) else {
            return false;
        };

        let owned = by_destination
            .get(&key.destination_id)
            .is_some_and(|entry| entry.id == run_id);
        if owned {
            by_destination.remove(&key.destination_id);
        }
        if by_destination.is_empty() {
            runs.remove(&key.initiator_id);
        }
        owned
    }

    /// Current state of the run under `key`.
    pub fn snapshot(&self, key: &RunKey) -> Option<RunSnapshot> {
        self.lock()
            .get(&key.initiator_id)
            .and_then(|m| m.get(&key.destination_id))
            .map(|entry| entry.snapshot(key.clone()))
    }

    /// Every active run of `initiator_id`, ordered by destination.
    pub fn runs_for(&self, initiator_id: &str) -> Vec<RunSnapshot> {
        let runs = self.lock();
        let mut snapshots: Vec<RunSnapshot> = runs
            .get(initiator_id)
            .map(|m| {
                m.iter()
                    .map(|(destination_id, entry)| {
                        entry.snapshot(RunKey::new(initiator_id, destination_id.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default();
        snapshots.sort_by(|a, b| a.key.destination_id.cmp(&b.key.destination_id));
        snapshots
    }

    /// Number of active runs across all initiators.
    pub fn len(&self) -> usize {
        self.lock().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RunEntry {
    fn snapshot(&self, key: RunKey) -> RunSnapshot {
        RunSnapshot {
            key,
            run_id: self.id,
            sent: self.progress.sent(),
            target: self.progress.target(),
            message: self.message.clone(),
            started_at: self.started_at,
        }
    }
}

/// Unregisters a run when dropped, whichever way its task ends.
pub(crate) struct RunGuard {
    registry: RunRegistry,
    key: RunKey,
    run_id: u64,
}

impl RunGuard {
    pub(crate) fn new(registry: RunRegistry, key: RunKey, run_id: u64) -> Self {
        Self {
            registry,
            key,
            run_id,
        }
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if self.registry.release(&self.key, self.run_id) {
            tracing::debug!("Run {} ({}) unregistered", self.run_id, self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_rejects_duplicate_key() {
        let registry = RunRegistry::new();
        let key = RunKey::new("u1", "c1");

        let first = registry.try_register(&key, "hello", 3).unwrap();
        let second = registry.try_register(&key, "other", 5);
        assert_eq!(second.unwrap_err(), ControllerError::AlreadyRunning(key.clone()));

        let snapshot = registry.snapshot(&key).unwrap();
        assert_eq!(snapshot.run_id, first.run_id);
        assert_eq!(snapshot.message, "hello");
        assert_eq!(snapshot.target, 3);
    }

    #[test]
    fn test_distinct_destinations_are_independent() {
        let registry = RunRegistry::new();
        registry.try_register(&RunKey::new("u1", "c1"), "a", 1).unwrap();
        registry.try_register(&RunKey::new("u1", "c2"), "b", 1).unwrap();
        registry.try_register(&RunKey::new("u2", "c1"), "c", 1).unwrap();
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_cancel_sets_token_and_removes() {
        let registry = RunRegistry::new();
        let key = RunKey::new("u1", "c1");
        let reg = registry.try_register(&key, "hello", 3).unwrap();

        assert!(registry.cancel(&key));
        assert!(reg.token.is_cancelled());
        assert!(registry.snapshot(&key).is_none());
        assert!(!registry.cancel(&key));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cancel_all_only_touches_initiator() {
        let registry = RunRegistry::new();
        let a = registry.try_register(&RunKey::new("u1", "c2"), "x", 1).unwrap();
        let b = registry.try_register(&RunKey::new("u1", "c1"), "x", 1).unwrap();
        let other = registry.try_register(&RunKey::new("u2", "c1"), "x", 1).unwrap();

        let stopped = registry.cancel_all("u1");
        assert_eq!(stopped, vec![RunKey::new("u1", "c1"), RunKey::new("u1", "c2")]);
        assert!(a.token.is_cancelled());
        assert!(b.token.is_cancelled());
        assert!(!other.token.is_cancelled());
        assert_eq!(registry.len(), 1);
        assert!(registry.cancel_all("u1").is_empty());
    }

    #[test]
    fn test_cancel_every_run() {
        let registry = RunRegistry::new();
        let a = registry.try_register(&RunKey::new("u2", "c1"), "x", 1).unwrap();
        let b = registry.try_register(&RunKey::new("u1", "c1"), "x", 1).unwrap();

        let stopped = registry.cancel_every_run();
        assert_eq!(stopped, vec![RunKey::new("u1", "c1"), RunKey::new("u2", "c1")]);
        assert!(a.token.is_cancelled());
        assert!(b.token.is_cancelled());
        assert!(registry.is_empty());
        assert!(registry.cancel_every_run().is_empty());
    }

    #[test]
    fn test_release_ignores_newer_run() {
        let registry = RunRegistry::new();
        let key = RunKey::new("u1", "c1");
        let old = registry.try_register(&key, "old", 3).unwrap();
        registry.cancel(&key);
        let new = registry.try_register(&key, "new", 3).unwrap();

        assert!(!registry.release(&key, old.run_id));
        assert!(registry.is_active(&key, new.run_id));
        assert!(registry.release(&key, new.run_id));
        assert!(!registry.is_active(&key, new.run_id));
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let registry = RunRegistry::new();
        let key = RunKey::new("u1", "c1");
        let reg = registry.try_register(&key, "hello", 2).unwrap();

        {
            let _guard = RunGuard::new(registry.clone(), key.clone(), reg.run_id);
            assert!(registry.is_active(&key, reg.run_id));
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_progress_visible_in_snapshot() {
        let registry = RunRegistry::new();
        let key = RunKey::new("u1", "c1");
        let reg = registry.try_register(&key, "hello", 4).unwrap();

        reg.progress.record_sent();
        reg.progress.record_sent();
        assert_eq!(registry.snapshot(&key).unwrap().sent, 2);
        assert_eq!(registry.runs_for("u1").len(), 1);
        assert!(registry.runs_for("u2").is_empty());
    }
}
