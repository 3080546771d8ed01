//! Agent configuration

use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Configuration for the Q-learning agent.
///
/// Supplied at construction, mutated only by the exploration decay rule,
/// and persisted alongside the decision table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Learning rate (alpha), in `(0, 1]`
    pub learning_rate: f64,
    /// Discount factor (gamma), in `[0, 1]`
    pub gamma: f64,
    /// Exploration rate (epsilon), in `[0, 1]`
    pub epsilon: f64,
    /// Multiplicative epsilon decay applied after every update, in `(0, 1]`
    pub epsilon_decay: f64,
    /// Floor for epsilon
    pub min_epsilon: f64,
    /// Mini-batch size for experience replay
    pub batch_size: usize,
    /// Buffer size for experience replay
    pub buffer_size: usize,
    /// Refresh the bootstrap table every N updates; 0 bootstraps from the
    /// live table
    pub target_update_freq: usize,
    /// Seed for the agent's random source; `None` seeds from entropy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            gamma: 0.9,
            epsilon: 0.2,
            epsilon_decay: 0.995,
            min_epsilon: 0.05,
            batch_size: 32,
            buffer_size: 10_000,
            target_update_freq: 0,
            seed: None,
        }
    }
}

impl AgentConfig {
    /// Check every field against its allowed range
    pub fn validate(&self) -> crate::Result<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(EngineError::Config(format!(
                "learning_rate must be in (0, 1], got {}",
                self.learning_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(EngineError::Config(format!(
                "gamma must be in [0, 1], got {}",
                self.gamma
            )));
        }
        if !(0.0..=1.0).contains(&self.epsilon) {
            return Err(EngineError::Config(format!(
                "epsilon must be in [0, 1], got {}",
                self.epsilon
            )));
        }
        if !(self.epsilon_decay > 0.0 && self.epsilon_decay <= 1.0) {
            return Err(EngineError::Config(format!(
                "epsilon_decay must be in (0, 1], got {}",
                self.epsilon_decay
            )));
        }
        if !(0.0..=1.0).contains(&self.min_epsilon) {
            return Err(EngineError::Config(format!(
                "min_epsilon must be in [0, 1], got {}",
                self.min_epsilon
            )));
        }
        if self.batch_size == 0 {
            return Err(EngineError::Config("batch_size must be at least 1".into()));
        }
        if self.buffer_size == 0 {
            return Err(EngineError::Config("buffer_size must be at least 1".into()));
        }
        Ok(())
    }

    /// Builder-style seed setter
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}
