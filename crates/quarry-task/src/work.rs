//! RL-driven task work
//!
//! Each step reads the environment, asks the domain optimizer for an action,
//! applies it through the actuator and feeds the outcome back to the agent.
//! Task progress is measured from the environment state against the state
//! seen when the task started.
//!
//! The agent only ever sees the part of the world the task allows: targets
//! outside the task radius (a square around the start position, ignoring
//! height) are hidden, and a circuit reports no spare components once the
//! task's component allowance is used up.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, trace};

use quarry_rl_agent::{DomainOptimizer, ModelVersionStore};
use quarry_rl_core::{
    ActionOutcome, Actuator, EngineError, EnvironmentState, Position, Reward, StateProvider,
};

use crate::controller::{StepOutcome, TaskWork};
use crate::task::{Task, TaskParams, TaskStatus};

/// Steps without progress before the attempt is abandoned
pub const DEFAULT_STALL_LIMIT: u32 = 50;

/// Where measurement starts from
#[derive(Debug, Clone, Copy, Default)]
struct Baseline {
    origin: Position,
    count: u32,
    distance: u32,
    components: usize,
}

fn within(origin: &Position, p: &Position, radius: u32) -> bool {
    origin.x.abs_diff(p.x) <= radius && origin.z.abs_diff(p.z) <= radius
}

/// [`TaskWork`] that learns while it acts
pub struct OptimizedWork {
    optimizer: DomainOptimizer,
    actuator: Arc<dyn Actuator>,
    provider: Arc<dyn StateProvider>,
    versions: Option<Arc<ModelVersionStore>>,
    params: Option<TaskParams>,
    task_label: String,
    baseline: Baseline,
    stall_limit: u32,
    stalled: u32,
    steps: u64,
    progress: f64,
    total_reward: Reward,
}

impl std::fmt::Debug for OptimizedWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimizedWork")
            .field("domain", &self.optimizer.kind())
            .field("steps", &self.steps)
            .field("progress", &self.progress)
            .finish_non_exhaustive()
    }
}

impl OptimizedWork {
    /// Work driven by `optimizer` against one environment
    pub fn new(
        optimizer: DomainOptimizer,
        actuator: Arc<dyn Actuator>,
        provider: Arc<dyn StateProvider>,
    ) -> Self {
        Self {
            optimizer,
            actuator,
            provider,
            versions: None,
            params: None,
            task_label: String::new(),
            baseline: Baseline::default(),
            stall_limit: DEFAULT_STALL_LIMIT,
            stalled: 0,
            steps: 0,
            progress: 0.0,
            total_reward: Reward::default(),
        }
    }

    /// Save a model version when the task ends
    #[must_use]
    pub fn with_versions(mut self, versions: Arc<ModelVersionStore>) -> Self {
        self.versions = Some(versions);
        self
    }

    /// Abandon an attempt after `limit` steps without progress
    #[must_use]
    pub fn with_stall_limit(mut self, limit: u32) -> Self {
        self.stall_limit = limit.max(1);
        self
    }

    fn params(&self) -> quarry_rl_core::Result<&TaskParams> {
        self.params
            .as_ref()
            .ok_or_else(|| EngineError::validation("work stepped before prepare"))
    }

    fn baseline_for(params: &TaskParams, state: &EnvironmentState) -> Baseline {
        let origin = state.position();
        match (params, state) {
            (TaskParams::Mining { .. }, EnvironmentState::Mining(s)) => Baseline {
                origin,
                count: s.collected,
                ..Baseline::default()
            },
            (TaskParams::Farming { .. }, EnvironmentState::Farming(s)) => Baseline {
                origin,
                count: s.harvested,
                ..Baseline::default()
            },
            (TaskParams::Redstone { .. }, EnvironmentState::Circuit(s)) => Baseline {
                origin,
                components: s.components.len(),
                ..Baseline::default()
            },
            (TaskParams::Navigation { destination, .. }, EnvironmentState::Navigation(s)) => {
                Baseline {
                    origin,
                    distance: s.position.manhattan(destination),
                    ..Baseline::default()
                }
            }
            _ => Baseline::default(),
        }
    }

    /// Reject an environment that is working on something else
    fn check_target(params: &TaskParams, state: &EnvironmentState) -> quarry_rl_core::Result<()> {
        match (params, state) {
            (TaskParams::Mining { target_block, .. }, EnvironmentState::Mining(s))
                if s.target_block != *target_block =>
            {
                Err(EngineError::validation(format!(
                    "task wants {target_block} but the environment mines {}",
                    s.target_block
                )))
            }
            (TaskParams::Farming { crop, .. }, EnvironmentState::Farming(s)) if s.crop != *crop => {
                Err(EngineError::validation(format!(
                    "task wants {crop} but the environment farms {}",
                    s.crop
                )))
            }
            _ => Ok(()),
        }
    }

    /// `state` cut down to what the task allows
    fn scoped(&self, params: &TaskParams, state: &EnvironmentState) -> EnvironmentState {
        let origin = self.baseline.origin;
        let mut state = state.clone();
        match (params, &mut state) {
            (TaskParams::Mining { radius, .. }, EnvironmentState::Mining(s)) => {
                s.nearby_targets.retain(|p| within(&origin, p, *radius));
            }
            (TaskParams::Farming { radius, .. }, EnvironmentState::Farming(s)) => {
                s.mature_crops.retain(|p| within(&origin, p, *radius));
                s.empty_farmland.retain(|p| within(&origin, p, *radius));
            }
            (TaskParams::Redstone { max_components, .. }, EnvironmentState::Circuit(s)) => {
                let placed = s.components.len().saturating_sub(self.baseline.components);
                let left =
                    max_components.saturating_sub(u32::try_from(placed).unwrap_or(u32::MAX));
                s.components_available = s.components_available.min(left);
            }
            _ => {}
        }
        state
    }

    /// Absolute progress in `state` and whether the goal is met
    fn measure(&self, params: &TaskParams, state: &EnvironmentState) -> (f64, bool) {
        match (params, state) {
            (TaskParams::Mining { quantity, .. }, EnvironmentState::Mining(s)) => {
                let gained = s.collected.saturating_sub(self.baseline.count);
                (f64::from(gained), gained >= *quantity)
            }
            (TaskParams::Farming { quantity, .. }, EnvironmentState::Farming(s)) => {
                let gained = s.harvested.saturating_sub(self.baseline.count);
                (f64::from(gained), gained >= *quantity)
            }
            (TaskParams::Redstone { target_signal, .. }, EnvironmentState::Circuit(s)) => {
                let gap = target_signal.abs_diff(s.output_signal);
                (f64::from(target_signal.saturating_sub(gap)), gap == 0)
            }
            (TaskParams::Navigation { destination, .. }, EnvironmentState::Navigation(s)) => {
                let left = s.position.manhattan(destination);
                let covered = self.baseline.distance.saturating_sub(left);
                (f64::from(covered), left == 0)
            }
            _ => (0.0, false),
        }
    }
}

#[async_trait]
impl TaskWork for OptimizedWork {
    async fn prepare(&mut self, task: &Task) -> quarry_rl_core::Result<Option<f64>> {
        if task.kind() != self.optimizer.kind() {
            return Err(EngineError::validation(format!(
                "{} task given to the {} optimizer",
                task.kind(),
                self.optimizer.kind()
            )));
        }
        let state = self.provider.current_state().await?;
        if state.kind() != task.kind() {
            return Err(EngineError::validation(format!(
                "environment reports a {} state for a {} task",
                state.kind(),
                task.kind()
            )));
        }

        Self::check_target(&task.params, &state)?;
        self.baseline = Self::baseline_for(&task.params, &state);
        self.task_label = format!("task {}", task.id);
        self.params = Some(task.params.clone());

        if let TaskParams::Navigation { max_distance, .. } = &task.params {
            if self.baseline.distance > *max_distance {
                return Err(EngineError::validation(format!(
                    "destination is {} blocks away, limit {max_distance}",
                    self.baseline.distance
                )));
            }
            return Ok(Some(f64::from(self.baseline.distance)));
        }
        Ok(None)
    }

    async fn step(&mut self) -> quarry_rl_core::Result<StepOutcome> {
        let state = self.provider.current_state().await?;
        let (_, already_done) = self.measure(self.params()?, &state);
        if already_done {
            return Ok(StepOutcome {
                progress: self.progress,
                location: Some(state.position()),
                done: true,
            });
        }

        let seen = self.scoped(self.params()?, &state);
        let action = self.optimizer.choose(&seen).await.ok_or_else(|| {
            EngineError::actuator(format!("no candidate actions in {} state", state.kind()))
        })?;
        let outcome = self.actuator.apply(&action).await?;
        let seen_after = ActionOutcome {
            state: self.scoped(self.params()?, &outcome.state),
            ..outcome.clone()
        };
        let feedback = self.optimizer.observe(&seen, &action, &seen_after).await;
        self.steps += 1;
        self.total_reward += feedback.reward;
        trace!(
            action = %action,
            success = outcome.success,
            reward = feedback.reward.value(),
            "Step applied"
        );

        let (progress, done) = self.measure(self.params()?, &outcome.state);
        self.progress = progress;

        if feedback.progress > 0.0 {
            self.stalled = 0;
        } else {
            self.stalled += 1;
        }
        if !done && feedback.terminal {
            self.stalled = 0;
            return Err(EngineError::actuator(format!(
                "{} episode ended short of the goal at {}",
                self.optimizer.kind(),
                outcome.state.position()
            )));
        }
        if !done && self.stalled >= self.stall_limit {
            self.stalled = 0;
            return Err(EngineError::actuator(format!(
                "no progress in {} steps",
                self.stall_limit
            )));
        }

        Ok(StepOutcome {
            progress,
            location: Some(outcome.state.position()),
            done,
        })
    }

    async fn finish(&mut self, status: TaskStatus) -> quarry_rl_core::Result<Option<Value>> {
        let epsilon = self.optimizer.agent().epsilon().await;
        let version = match &self.versions {
            Some(versions) => {
                let label = format!("{} {status}", self.task_label);
                let saved = versions
                    .checkpoint(self.optimizer.agent(), Some(&label))
                    .await?;
                debug!(version = saved.version, "Checkpoint written");
                Some(saved.version)
            }
            None => None,
        };

        Ok(Some(json!({
            "domain": self.optimizer.kind().as_str(),
            "steps": self.steps,
            "progress": self.progress,
            "total_reward": self.total_reward.value(),
            "epsilon": epsilon,
            "model_version": version,
        })))
    }
}
