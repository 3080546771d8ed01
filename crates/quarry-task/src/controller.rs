//! Task lifecycle controller
//!
//! Drives one [`Task`] through `Pending -> InProgress -> {Completed | Failed |
//! Cancelled}`, calling into a [`TaskWork`] step by step. Step failures go
//! through a bounded retry cycle; each retry re-enters `InProgress`. The
//! timeout is wall-clock from task start and is checked between steps, so
//! retry delays count against it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{watch, Notify};
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use quarry_rl_core::{BlobStore, EngineError, Position};

use crate::progress::{ProgressSnapshot, ProgressTracker};
use crate::task::{Task, TaskStatus};

/// Delay growth between retries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay before every retry
    #[default]
    Fixed,
    /// `base * 2^(n-1)` before retry `n`, capped
    Exponential,
}

/// Retry and timeout policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Base delay before a retry
    pub retry_delay_ms: u64,
    /// Delay growth
    pub backoff: Backoff,
    /// Upper bound for exponential delays
    pub max_retry_delay_ms: u64,
    /// Wall-clock budget measured from task start
    pub timeout_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 5_000,
            backoff: Backoff::Fixed,
            max_retry_delay_ms: 60_000,
            timeout_secs: 70,
        }
    }
}

impl ControllerConfig {
    /// Delay before retry number `retry` (1-based)
    #[must_use]
    pub fn retry_delay(&self, retry: u32) -> Duration {
        let base = self.retry_delay_ms;
        let ms = match self.backoff {
            Backoff::Fixed => base,
            Backoff::Exponential => {
                let shift = retry.saturating_sub(1).min(32);
                base.saturating_mul(1_u64 << shift)
                    .min(self.max_retry_delay_ms.max(base))
            }
        };
        Duration::from_millis(ms)
    }

    /// Wall-clock budget for the whole task
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Reject settings that would make the controller spin or never time out
    pub fn validate(&self) -> quarry_rl_core::Result<()> {
        if self.timeout_secs == 0 {
            return Err(EngineError::Config("timeout_secs must be positive".into()));
        }
        if self.backoff == Backoff::Exponential && self.max_retry_delay_ms < self.retry_delay_ms {
            return Err(EngineError::Config(
                "max_retry_delay_ms must be at least retry_delay_ms".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct StopInner {
    stopped: AtomicBool,
    notify: Notify,
}

/// Cooperative cancellation flag shared with a running controller
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    inner: Arc<StopInner>,
}

impl StopHandle {
    /// Create an unset handle
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Takes effect at the next iteration boundary.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Whether a stop was requested
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Resolve once a stop is requested
    pub async fn stopped(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

/// Result of one work step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutcome {
    /// Absolute progress after the step
    pub progress: f64,
    /// Where the agent is now, if known
    pub location: Option<Position>,
    /// The goal is reached
    pub done: bool,
}

/// The domain-specific part of a task
#[async_trait]
pub trait TaskWork: Send {
    /// Called once before the first step succeeds in starting. May return a
    /// progress total that only the live environment can tell.
    async fn prepare(&mut self, task: &Task) -> quarry_rl_core::Result<Option<f64>>;

    /// Perform one unit of work
    async fn step(&mut self) -> quarry_rl_core::Result<StepOutcome>;

    /// Called once the task reaches a terminal status after running at
    /// least one attempt. Returns the task's result payload.
    async fn finish(&mut self, status: TaskStatus) -> quarry_rl_core::Result<Option<Value>>;
}

/// Final report of an executed task
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    /// Task ID
    pub task_id: Uuid,
    /// Terminal status
    pub status: TaskStatus,
    /// `status == Completed`
    pub success: bool,
    /// Wall time spent in `execute`
    pub elapsed: Duration,
    /// Attempts started
    pub attempts: u32,
    /// Retries taken
    pub retry_count: u32,
    /// Message of the error that ended the task
    pub error: Option<String>,
    /// Work-specific result
    pub payload: Option<Value>,
}

enum Ending {
    Completed,
    Cancelled,
    Failed(EngineError),
}

/// Runs one task to a terminal status
pub struct TaskController<W> {
    task: Task,
    work: W,
    config: ControllerConfig,
    tracker: ProgressTracker,
    stop: StopHandle,
    prepared: bool,
    last_error: Option<String>,
}

impl<W> std::fmt::Debug for TaskController<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskController")
            .field("task", &self.task.id)
            .field("status", &self.task.status())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<W: TaskWork> TaskController<W> {
    /// Create a controller for a pending task
    pub fn new(task: Task, work: W, config: ControllerConfig) -> Self {
        let total = task.params.total_progress().unwrap_or(0.0);
        let tracker = ProgressTracker::new(task.id, total, None);
        Self {
            task,
            work,
            config,
            tracker,
            stop: StopHandle::new(),
            prepared: false,
            last_error: None,
        }
    }

    /// Persist progress snapshots to `store`
    #[must_use]
    pub fn with_progress_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.tracker = ProgressTracker::new(self.task.id, self.tracker.total(), Some(store));
        self
    }

    /// Share an externally created stop handle
    #[must_use]
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    /// The task as it stands
    #[must_use]
    pub fn task(&self) -> &Task {
        &self.task
    }

    /// Handle that stops this controller
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Request a cooperative stop
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Latest progress snapshot
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.tracker.snapshot()
    }

    /// Receive every progress snapshot
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.tracker.subscribe()
    }

    /// Record absolute progress. Never fails.
    pub async fn update_progress(&mut self, value: f64) -> ProgressSnapshot {
        self.tracker.update(value).await
    }

    /// Whether another retry is allowed
    #[must_use]
    pub fn should_retry(&self) -> bool {
        self.task.retry_count < self.config.max_retries
    }

    /// Take one retry: count it and wait out the delay. A stop request cuts
    /// the wait short.
    pub async fn retry(&mut self) -> quarry_rl_core::Result<()> {
        if !self.should_retry() {
            return Err(EngineError::RetryExhausted {
                attempts: self.task.attempts,
                last_error: self.last_error.clone().unwrap_or_default(),
            });
        }
        self.task.retry_count += 1;
        self.tracker.set_retry_count(self.task.retry_count);
        let delay = self.config.retry_delay(self.task.retry_count);
        info!(
            retry = self.task.retry_count,
            max_retries = self.config.max_retries,
            delay_ms = delay.as_millis() as u64,
            "Retrying task"
        );
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = self.stop.stopped() => debug!("Retry wait interrupted by stop"),
        }
        Ok(())
    }

    /// Run the task to a terminal status
    pub async fn execute(&mut self) -> TaskResult {
        let span = info_span!(
            "task",
            task_id = %self.task.id,
            domain = %self.task.kind(),
        );
        async {
            let started = Instant::now();
            let ending = self.drive(started).await;
            self.conclude(ending, started.elapsed()).await
        }
        .instrument(span)
        .await
    }

    async fn drive(&mut self, started: Instant) -> Ending {
        if let Err(e) = self.task.params.validate() {
            return Ending::Failed(e);
        }
        info!(params = ?self.task.params, "Task started");
        self.update_progress(0.0).await;

        loop {
            if self.stop.is_stopped() {
                return Ending::Cancelled;
            }
            if let Err(e) = self.task.transition(TaskStatus::InProgress) {
                return Ending::Failed(e);
            }
            self.task.attempts += 1;
            self.tracker.set_status(TaskStatus::InProgress);
            metrics::counter!("quarry_task_attempts_total", 1);

            let attempt = self.task.attempts;
            let failure = match self
                .run_attempt(started)
                .instrument(info_span!("attempt", attempt))
                .await
            {
                Ending::Failed(e) => e,
                other => return other,
            };

            if !failure.is_retryable() {
                return Ending::Failed(failure);
            }
            warn!(
                attempt,
                params = ?self.task.params,
                error = %failure,
                kind = failure.kind(),
                "Task attempt failed"
            );
            self.tracker.record_error();
            self.last_error = Some(failure.to_string());
            self.tracker.publish().await;

            if let Err(e) = self.retry().await {
                return Ending::Failed(e);
            }
        }
    }

    async fn run_attempt(&mut self, started: Instant) -> Ending {
        let budget = self.config.timeout();

        if !self.prepared {
            match self.work.prepare(&self.task).await {
                Ok(total) => {
                    if let Some(total) = total {
                        self.tracker.set_total(total);
                    }
                    self.prepared = true;
                }
                Err(e) => return Ending::Failed(e),
            }
        }

        loop {
            if self.stop.is_stopped() {
                return Ending::Cancelled;
            }

            let result = self.work.step().await;
            let elapsed = started.elapsed();
            if elapsed > budget {
                return Ending::Failed(EngineError::Timeout { elapsed, budget });
            }

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => return Ending::Failed(e),
            };
            if let Some(location) = outcome.location {
                self.tracker.set_location(location);
            }
            let snapshot = self.update_progress(outcome.progress).await;
            let reached = snapshot.total > 0.0 && snapshot.current >= snapshot.total;
            if outcome.done || reached {
                return Ending::Completed;
            }
        }
    }

    async fn conclude(&mut self, ending: Ending, elapsed: Duration) -> TaskResult {
        let (status, failure) = match ending {
            Ending::Completed => (TaskStatus::Completed, None),
            Ending::Cancelled => (TaskStatus::Cancelled, None),
            Ending::Failed(e) => (TaskStatus::Failed, Some(e)),
        };

        if let Err(e) = self.task.transition(status) {
            error!(error = %e, "Terminal transition rejected");
        }
        self.task.error = failure.as_ref().map(ToString::to_string);
        self.tracker.set_status(status);
        self.tracker.publish().await;

        let payload = if self.task.attempts > 0 {
            match self.work.finish(status).await {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(error = %e, "Task finish hook failed");
                    None
                }
            }
        } else {
            None
        };

        metrics::counter!("quarry_task_outcomes_total", 1, "status" => status.as_str());
        metrics::histogram!("quarry_task_duration_seconds", elapsed.as_secs_f64());

        match &failure {
            Some(e) => error!(
                status = %status,
                attempts = self.task.attempts,
                error = %e,
                "Task failed"
            ),
            None => info!(
                status = %status,
                attempts = self.task.attempts,
                elapsed_ms = elapsed.as_millis() as u64,
                "Task finished"
            ),
        }

        TaskResult {
            task_id: self.task.id,
            status,
            success: status == TaskStatus::Completed,
            elapsed,
            attempts: self.task.attempts,
            retry_count: self.task.retry_count,
            error: self.task.error.clone(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskParams;

    /// Work that fails its first `failures` steps, then gains one unit per step
    #[derive(Default)]
    struct ScriptedWork {
        failures: u32,
        steps: u32,
        progress: f64,
        finished: Option<TaskStatus>,
    }

    #[async_trait]
    impl TaskWork for ScriptedWork {
        async fn prepare(&mut self, _task: &Task) -> quarry_rl_core::Result<Option<f64>> {
            Ok(None)
        }

        async fn step(&mut self) -> quarry_rl_core::Result<StepOutcome> {
            self.steps += 1;
            if self.failures > 0 {
                self.failures -= 1;
                return Err(EngineError::actuator("block out of reach"));
            }
            self.progress += 1.0;
            Ok(StepOutcome {
                progress: self.progress,
                location: None,
                done: false,
            })
        }

        async fn finish(&mut self, status: TaskStatus) -> quarry_rl_core::Result<Option<Value>> {
            self.finished = Some(status);
            Ok(Some(serde_json::json!({ "collected": self.progress })))
        }
    }

    fn mining(quantity: u32) -> Task {
        Task::new(TaskParams::Mining {
            target_block: "stone".into(),
            quantity,
            radius: 8,
        })
    }

    #[test]
    fn test_retry_delays() {
        let fixed = ControllerConfig::default();
        assert_eq!(fixed.retry_delay(1), Duration::from_secs(5));
        assert_eq!(fixed.retry_delay(3), Duration::from_secs(5));

        let exp = ControllerConfig {
            backoff: Backoff::Exponential,
            retry_delay_ms: 1_000,
            max_retry_delay_ms: 5_000,
            ..ControllerConfig::default()
        };
        assert_eq!(exp.retry_delay(1), Duration::from_secs(1));
        assert_eq!(exp.retry_delay(2), Duration::from_secs(2));
        assert_eq!(exp.retry_delay(3), Duration::from_secs(4));
        assert_eq!(exp.retry_delay(4), Duration::from_secs(5));
        assert_eq!(exp.retry_delay(40), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_after_transient_failures() {
        let work = ScriptedWork {
            failures: 2,
            ..ScriptedWork::default()
        };
        let mut controller = TaskController::new(mining(3), work, ControllerConfig::default());
        let result = controller.execute().await;

        assert!(result.success);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.retry_count, 2);
        assert!(result.elapsed >= Duration::from_secs(10));
        assert_eq!(result.payload, Some(serde_json::json!({ "collected": 3.0 })));
        assert_eq!(controller.work.finished, Some(TaskStatus::Completed));

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.status, TaskStatus::Completed);
        assert_eq!(snapshot.error_count, 2);
        assert!((snapshot.current - 3.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_validation_failure_is_not_retried() {
        let mut controller =
            TaskController::new(mining(0), ScriptedWork::default(), ControllerConfig::default());
        let result = controller.execute().await;

        assert_eq!(result.status, TaskStatus::Failed);
        assert_eq!(result.attempts, 0);
        assert_eq!(controller.work.steps, 0);
        assert!(result.error.unwrap().contains("quantity"));
        assert_eq!(
            controller.task().status_trail(),
            vec![TaskStatus::Pending, TaskStatus::Failed]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_discards_step_result() {
        struct SlowWork;

        #[async_trait]
        impl TaskWork for SlowWork {
            async fn prepare(&mut self, _task: &Task) -> quarry_rl_core::Result<Option<f64>> {
                Ok(None)
            }

            async fn step(&mut self) -> quarry_rl_core::Result<StepOutcome> {
                tokio::time::sleep(Duration::from_secs(80)).await;
                Ok(StepOutcome {
                    progress: 1.0,
                    location: None,
                    done: true,
                })
            }

            async fn finish(&mut self, _status: TaskStatus) -> quarry_rl_core::Result<Option<Value>> {
                Ok(None)
            }
        }

        let config = ControllerConfig {
            max_retries: 0,
            ..ControllerConfig::default()
        };
        let mut controller = TaskController::new(mining(1), SlowWork, config);
        let result = controller.execute().await;

        assert_eq!(result.status, TaskStatus::Failed);
        assert!(result.error.unwrap().contains("timed out"));
        assert!(controller.snapshot().current.abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_spans_retries() {
        /// 40s per step; the first step fails, later ones finish the task
        #[derive(Default)]
        struct SluggishWork {
            steps: u32,
        }

        #[async_trait]
        impl TaskWork for SluggishWork {
            async fn prepare(&mut self, _task: &Task) -> quarry_rl_core::Result<Option<f64>> {
                Ok(None)
            }

            async fn step(&mut self) -> quarry_rl_core::Result<StepOutcome> {
                tokio::time::sleep(Duration::from_secs(40)).await;
                self.steps += 1;
                if self.steps == 1 {
                    return Err(EngineError::actuator("path blocked"));
                }
                Ok(StepOutcome {
                    progress: 1.0,
                    location: None,
                    done: true,
                })
            }

            async fn finish(&mut self, _status: TaskStatus) -> quarry_rl_core::Result<Option<Value>> {
                Ok(None)
            }
        }

        // 40s fail, 5s wait, second step returns at 85s against a 70s budget
        let config = ControllerConfig {
            max_retries: 1,
            ..ControllerConfig::default()
        };
        let mut controller = TaskController::new(mining(1), SluggishWork::default(), config);
        let result = controller.execute().await;

        assert_eq!(result.status, TaskStatus::Failed);
        assert!(!result.success);
        assert_eq!(controller.work.steps, 2);
        assert!(result.error.unwrap().contains("timed out"));
        assert!(result.elapsed >= Duration::from_secs(85));
    }

    #[tokio::test]
    async fn test_stop_mid_run() {
        struct StoppingWork {
            stop: StopHandle,
            steps: u32,
        }

        #[async_trait]
        impl TaskWork for StoppingWork {
            async fn prepare(&mut self, _task: &Task) -> quarry_rl_core::Result<Option<f64>> {
                Ok(Some(100.0))
            }

            async fn step(&mut self) -> quarry_rl_core::Result<StepOutcome> {
                self.steps += 1;
                if self.steps == 3 {
                    self.stop.stop();
                }
                Ok(StepOutcome {
                    progress: f64::from(self.steps),
                    ..StepOutcome::default()
                })
            }

            async fn finish(&mut self, _status: TaskStatus) -> quarry_rl_core::Result<Option<Value>> {
                Ok(None)
            }
        }

        let stop = StopHandle::new();
        let work = StoppingWork {
            stop: stop.clone(),
            steps: 0,
        };
        let mut controller = TaskController::new(mining(100), work, ControllerConfig::default())
            .with_stop_handle(stop);
        let result = controller.execute().await;

        assert_eq!(result.status, TaskStatus::Cancelled);
        assert_eq!(controller.work.steps, 3);
        assert!((controller.snapshot().current - 3.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_retry_wait() {
        let work = ScriptedWork {
            failures: u32::MAX,
            ..ScriptedWork::default()
        };
        let config = ControllerConfig {
            retry_delay_ms: 3_600_000,
            ..ControllerConfig::default()
        };
        let mut controller = TaskController::new(mining(1), work, config);
        let stop = controller.stop_handle();

        let run = tokio::spawn(async move {
            let result = controller.execute().await;
            (result, controller.work.steps)
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        stop.stop();

        let (result, steps) = run.await.unwrap();
        assert_eq!(result.status, TaskStatus::Cancelled);
        assert_eq!(steps, 1);
        assert!(result.elapsed < Duration::from_secs(3_600));
    }
}
