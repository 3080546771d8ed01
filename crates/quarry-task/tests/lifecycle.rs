//! Controller lifecycle scenarios against scripted and simulated work

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use quarry_rl_agent::{DomainOptimizer, QLearningAgent, SharedAgent};
use quarry_rl_core::{AgentConfig, EngineError, MemoryBlobStore, Position};
use quarry_rl_env::{MiningDomain, SimulatedWorld};
use quarry_task::{
    ControllerConfig, OptimizedWork, ProgressSnapshot, StepOutcome, Task, TaskController,
    TaskParams, TaskStatus, TaskWork,
};

/// Every step fails with a transient error
#[derive(Default)]
struct AlwaysFailing {
    steps: u32,
}

#[async_trait]
impl TaskWork for AlwaysFailing {
    async fn prepare(&mut self, _task: &Task) -> quarry_rl_core::Result<Option<f64>> {
        Ok(None)
    }

    async fn step(&mut self) -> quarry_rl_core::Result<StepOutcome> {
        self.steps += 1;
        Err(EngineError::actuator("connection reset"))
    }

    async fn finish(&mut self, _status: TaskStatus) -> quarry_rl_core::Result<Option<Value>> {
        Ok(None)
    }
}

fn farming_task() -> Task {
    Task::new(TaskParams::Farming {
        crop: "wheat".into(),
        quantity: 4,
        radius: 8,
    })
}

fn with_retries(max_retries: u32) -> ControllerConfig {
    ControllerConfig {
        max_retries,
        ..ControllerConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_fail_with_exact_history() {
    let mut controller = TaskController::new(farming_task(), AlwaysFailing::default(), with_retries(2));
    let result = controller.execute().await;

    assert_eq!(result.status, TaskStatus::Failed);
    assert!(!result.success);
    assert_eq!(result.attempts, 3);
    assert_eq!(result.retry_count, 2);
    assert!(result.error.as_deref().unwrap().contains("connection reset"));
    assert_eq!(
        controller.task().status_trail(),
        vec![
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::InProgress,
            TaskStatus::InProgress,
            TaskStatus::Failed,
        ]
    );
    assert_eq!(controller.snapshot().error_count, 3);
}

#[tokio::test(start_paused = true)]
async fn retry_count_never_exceeds_maximum() {
    for max_retries in 0..5 {
        let mut controller =
            TaskController::new(farming_task(), AlwaysFailing::default(), with_retries(max_retries));
        let result = controller.execute().await;

        assert_eq!(result.status, TaskStatus::Failed);
        assert_eq!(result.retry_count, max_retries);
        assert_eq!(result.attempts, max_retries + 1);
        assert!(!controller.should_retry());
        assert!(matches!(
            controller.retry().await,
            Err(EngineError::RetryExhausted { .. })
        ));
    }
}

#[tokio::test(start_paused = true)]
async fn fixed_retry_delay_is_observed() {
    let mut controller = TaskController::new(farming_task(), AlwaysFailing::default(), with_retries(3));
    let result = controller.execute().await;
    assert!(result.elapsed >= Duration::from_secs(15));
}

#[tokio::test]
async fn repeated_progress_updates_are_idempotent_but_recorded() {
    let store = Arc::new(MemoryBlobStore::new());
    let mut controller = TaskController::new(
        farming_task(),
        AlwaysFailing::default(),
        ControllerConfig::default(),
    )
    .with_progress_store(store.clone());

    let first = controller.update_progress(2.0).await;
    let second = controller.update_progress(2.0).await;
    assert!((first.current - second.current).abs() < f64::EPSILON);
    assert_eq!(second.history.len(), first.history.len() + 1);

    let clamped = controller.update_progress(9.0).await;
    assert!((clamped.current - 4.0).abs() < f64::EPSILON);

    let polled = ProgressSnapshot::load(store.as_ref(), controller.task().id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(polled.history.len(), 3);
}

#[tokio::test]
async fn cancel_before_first_step_does_no_work() {
    let world = Arc::new(SimulatedWorld::mining_field(
        Position::new(0, 64, 0),
        "coal_ore",
        5,
        6,
        3,
    ));
    let agent = SharedAgent::new(QLearningAgent::new(AgentConfig::default()).unwrap());
    let optimizer = DomainOptimizer::new(Arc::new(MiningDomain::new()), agent.clone());
    let work = OptimizedWork::new(optimizer, world.clone(), world.clone());
    let task = Task::new(TaskParams::Mining {
        target_block: "coal_ore".into(),
        quantity: 3,
        radius: 6,
    });

    let mut controller = TaskController::new(task, work, ControllerConfig::default());
    controller.stop();
    let result = controller.execute().await;

    assert_eq!(result.status, TaskStatus::Cancelled);
    assert_eq!(result.attempts, 0);
    assert!(result.payload.is_none());
    assert_eq!(world.actions_applied().await, 0);
    assert_eq!(agent.lock().await.updates(), 0);
    assert_eq!(
        controller.task().status_trail(),
        vec![TaskStatus::Pending, TaskStatus::Cancelled]
    );
}

#[tokio::test(start_paused = true)]
async fn injected_actuator_failures_are_retried() {
    let world = Arc::new(
        SimulatedWorld::mining_field(Position::new(0, 64, 0), "iron_ore", 6, 5, 9).fail_next(2),
    );
    let agent = SharedAgent::new(QLearningAgent::new(AgentConfig::default().with_seed(9)).unwrap());
    let optimizer = DomainOptimizer::new(Arc::new(MiningDomain::new()), agent);
    let work = OptimizedWork::new(optimizer, world.clone(), world.clone());
    let task = Task::new(TaskParams::Mining {
        target_block: "iron_ore".into(),
        quantity: 2,
        radius: 5,
    });

    let mut controller = TaskController::new(task, work, ControllerConfig::default());
    let result = controller.execute().await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.retry_count, 2);
    assert_eq!(result.attempts, 3);
    let payload = result.payload.unwrap();
    assert_eq!(payload["domain"], "mining");
    assert!(payload["model_version"].is_null());
}
