//! Progress snapshots and their tracker
//!
//! Every progress update produces a new immutable [`ProgressSnapshot`],
//! publishes it to watchers and persists it under `progress/<task id>` so
//! external pollers and crash recovery see the latest one.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::warn;
use uuid::Uuid;

use quarry_rl_core::{BlobStore, EngineError, Position};

use crate::TaskStatus;

/// One `(timestamp, progress)` history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEntry {
    /// When the update was made
    pub at: DateTime<Utc>,
    /// Progress value recorded
    pub progress: f64,
}

/// Immutable progress record for one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Task the snapshot belongs to
    pub task_id: Uuid,
    /// Progress so far, within `[0, total]`
    pub current: f64,
    /// Progress needed to complete
    pub total: f64,
    /// Status at the time of the snapshot
    pub status: TaskStatus,
    /// Estimated seconds until completion, when a rate is known
    pub eta_secs: Option<f64>,
    /// Last known location of the agent
    pub location: Option<Position>,
    /// Step failures observed
    pub error_count: u32,
    /// Retries taken
    pub retry_count: u32,
    /// Every update, oldest first
    pub history: Vec<ProgressEntry>,
    /// When the snapshot was produced
    pub updated_at: DateTime<Utc>,
}

impl ProgressSnapshot {
    /// Blob key for a task's snapshot
    #[must_use]
    pub fn key(task_id: Uuid) -> String {
        format!("progress/{task_id}")
    }

    /// Completion ratio in `[0, 1]`
    #[must_use]
    pub fn fraction(&self) -> f64 {
        if self.total <= 0.0 {
            return 0.0;
        }
        (self.current / self.total).clamp(0.0, 1.0)
    }

    /// Read a persisted snapshot
    pub async fn load(
        store: &dyn BlobStore,
        task_id: Uuid,
    ) -> quarry_rl_core::Result<Option<ProgressSnapshot>> {
        let Some(bytes) = store.get(&Self::key(task_id)).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| EngineError::persistence(format!("bad progress snapshot: {e}")))
    }
}

/// Accumulates progress for one task and produces snapshots
pub struct ProgressTracker {
    task_id: Uuid,
    total: f64,
    current: f64,
    status: TaskStatus,
    location: Option<Position>,
    error_count: u32,
    retry_count: u32,
    history: Vec<ProgressEntry>,
    started: Instant,
    store: Option<Arc<dyn BlobStore>>,
    publisher: watch::Sender<ProgressSnapshot>,
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("task_id", &self.task_id)
            .field("current", &self.current)
            .field("total", &self.total)
            .finish_non_exhaustive()
    }
}

impl ProgressTracker {
    /// Create a tracker at zero progress. Snapshots are persisted to `store`
    /// when one is given.
    pub fn new(task_id: Uuid, total: f64, store: Option<Arc<dyn BlobStore>>) -> Self {
        let initial = ProgressSnapshot {
            task_id,
            current: 0.0,
            total: total.max(0.0),
            status: TaskStatus::Pending,
            eta_secs: None,
            location: None,
            error_count: 0,
            retry_count: 0,
            history: Vec::new(),
            updated_at: Utc::now(),
        };
        let (publisher, _) = watch::channel(initial);
        Self {
            task_id,
            total: total.max(0.0),
            current: 0.0,
            status: TaskStatus::Pending,
            location: None,
            error_count: 0,
            retry_count: 0,
            history: Vec::new(),
            started: Instant::now(),
            store,
            publisher,
        }
    }

    /// Receive every snapshot as it is produced
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.publisher.subscribe()
    }

    /// Latest snapshot
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.publisher.borrow().clone()
    }

    /// Current progress value
    #[must_use]
    pub fn current(&self) -> f64 {
        self.current
    }

    /// Progress needed to complete
    #[must_use]
    pub fn total(&self) -> f64 {
        self.total
    }

    /// Change the total once it is known. Restarts the rate clock.
    pub fn set_total(&mut self, total: f64) {
        self.total = total.max(0.0);
        self.current = self.current.min(self.total);
        self.started = Instant::now();
    }

    /// Record a status change for the next snapshot
    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
    }

    /// Record the agent's last known location for the next snapshot
    pub fn set_location(&mut self, location: Position) {
        self.location = Some(location);
    }

    /// Count a step failure
    pub fn record_error(&mut self) {
        self.error_count += 1;
    }

    /// Record the retry counter
    pub fn set_retry_count(&mut self, retries: u32) {
        self.retry_count = retries;
    }

    /// Clamp `value` into `[0, total]`, append it to the history, recompute
    /// the ETA and persist the snapshot.
    ///
    /// Never fails: persistence errors are logged and dropped.
    pub async fn update(&mut self, value: f64) -> ProgressSnapshot {
        let value = if value.is_nan() { self.current } else { value };
        self.current = value.clamp(0.0, self.total);
        self.history.push(ProgressEntry {
            at: Utc::now(),
            progress: self.current,
        });
        self.publish().await
    }

    /// Produce and persist a snapshot without appending progress history
    pub async fn publish(&mut self) -> ProgressSnapshot {
        let snapshot = ProgressSnapshot {
            task_id: self.task_id,
            current: self.current,
            total: self.total,
            status: self.status,
            eta_secs: self.eta_secs(),
            location: self.location,
            error_count: self.error_count,
            retry_count: self.retry_count,
            history: self.history.clone(),
            updated_at: Utc::now(),
        };
        self.persist(&snapshot).await;
        self.publisher.send_replace(snapshot.clone());
        snapshot
    }

    /// Remaining progress divided by the observed rate since start
    fn eta_secs(&self) -> Option<f64> {
        if self.current >= self.total {
            return Some(0.0);
        }
        let elapsed = self.started.elapsed().as_secs_f64();
        if self.current <= 0.0 || elapsed <= 0.0 {
            return None;
        }
        let rate = self.current / elapsed;
        Some((self.total - self.current) / rate)
    }

    async fn persist(&self, snapshot: &ProgressSnapshot) {
        let Some(store) = &self.store else {
            return;
        };
        let key = ProgressSnapshot::key(self.task_id);
        let result = match serde_json::to_vec(snapshot) {
            Ok(bytes) => store.put(&key, &bytes).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!(task_id = %self.task_id, error = %e, "Failed to persist progress snapshot");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quarry_rl_core::MemoryBlobStore;
    use std::time::Duration;

    /// Store whose writes always fail
    struct BrokenStore;

    #[async_trait]
    impl BlobStore for BrokenStore {
        async fn get(&self, _key: &str) -> quarry_rl_core::Result<Option<Vec<u8>>> {
            Ok(None)
        }

        async fn put(&self, _key: &str, _bytes: &[u8]) -> quarry_rl_core::Result<()> {
            Err(EngineError::persistence("disk full"))
        }

        async fn delete(&self, _key: &str) -> quarry_rl_core::Result<()> {
            Ok(())
        }

        async fn list(&self, _prefix: &str) -> quarry_rl_core::Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_repeated_value_appends_history() {
        let mut tracker = ProgressTracker::new(Uuid::new_v4(), 10.0, None);
        let first = tracker.update(4.0).await;
        let second = tracker.update(4.0).await;

        assert!((first.current - second.current).abs() < f64::EPSILON);
        assert_eq!(first.history.len(), 1);
        assert_eq!(second.history.len(), 2);
        assert!((second.history[1].progress - 4.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_clamps_to_range() {
        let mut tracker = ProgressTracker::new(Uuid::new_v4(), 5.0, None);
        assert!((tracker.update(12.0).await.current - 5.0).abs() < f64::EPSILON);
        assert!((tracker.update(-3.0).await.current).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eta_from_rate() {
        let mut tracker = ProgressTracker::new(Uuid::new_v4(), 10.0, None);
        tokio::time::advance(Duration::from_secs(4)).await;
        let snapshot = tracker.update(2.0).await;
        // 2 units in 4 s leaves 8 units at 0.5/s
        let eta = snapshot.eta_secs.unwrap();
        assert!((eta - 16.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_persisted_for_polling() {
        let store = Arc::new(MemoryBlobStore::new());
        let id = Uuid::new_v4();
        let mut tracker = ProgressTracker::new(id, 3.0, Some(store.clone()));
        tracker.set_location(Position::new(1, 2, 3));
        tracker.update(1.0).await;

        let loaded = ProgressSnapshot::load(store.as_ref(), id).await.unwrap().unwrap();
        assert!((loaded.current - 1.0).abs() < f64::EPSILON);
        assert_eq!(loaded.location, Some(Position::new(1, 2, 3)));
        assert_eq!(tracker.subscribe().borrow().history.len(), 1);
    }

    #[tokio::test]
    async fn test_persistence_errors_are_swallowed() {
        let mut tracker = ProgressTracker::new(Uuid::new_v4(), 3.0, Some(Arc::new(BrokenStore)));
        let snapshot = tracker.update(2.0).await;
        assert!((snapshot.current - 2.0).abs() < f64::EPSILON);
    }
}
