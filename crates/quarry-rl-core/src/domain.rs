//! Domain plug-in contract
//!
//! Every task family (mining, farming, redstone, navigation) supplies one
//! [`Domain`] implementation. The Q-learning agent is injected with it
//! instead of being subclassed: the domain owns the encoders, the reward
//! function and the candidate action set, the agent owns the table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Action, ActionKey, ActionOutcome, EngineError, EnvironmentState, Reward, StateKey};

/// Task domains known to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainKind {
    /// Resource extraction
    Mining,
    /// Area maintenance
    Farming,
    /// Circuit optimization
    Redstone,
    /// Movement
    Navigation,
}

impl DomainKind {
    /// All domains, in a stable order
    pub const ALL: [DomainKind; 4] = [
        DomainKind::Mining,
        DomainKind::Farming,
        DomainKind::Redstone,
        DomainKind::Navigation,
    ];

    /// Stable lowercase name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mining => "mining",
            Self::Farming => "farming",
            Self::Redstone => "redstone",
            Self::Navigation => "navigation",
        }
    }
}

impl fmt::Display for DomainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DomainKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mining" => Ok(Self::Mining),
            "farming" => Ok(Self::Farming),
            "redstone" | "circuit" => Ok(Self::Redstone),
            "navigation" | "movement" => Ok(Self::Navigation),
            other => Err(EngineError::validation(format!("unknown domain: {other}"))),
        }
    }
}

/// Capability interface a task domain plugs into the agent
pub trait Domain: Send + Sync {
    /// Which domain this is
    fn kind(&self) -> DomainKind;

    /// Reduce a state to the key the agent indexes its table with.
    /// Must be deterministic.
    fn encode_state(&self, state: &EnvironmentState) -> StateKey;

    /// Reduce an action taken in `state` to its table key. Keys are
    /// relative to the state (direction, component kind) so the same move
    /// from different positions shares one table entry. Must be
    /// deterministic.
    fn encode_action(&self, state: &EnvironmentState, action: &Action) -> ActionKey;

    /// Reward for the transition `state --action--> next_state`
    fn compute_reward(
        &self,
        state: &EnvironmentState,
        action: &Action,
        next_state: &EnvironmentState,
        outcome: &ActionOutcome,
    ) -> Reward;

    /// Actions worth considering in `state`. An empty set means the domain
    /// has nothing to do.
    fn candidate_actions(&self, state: &EnvironmentState) -> Vec<Action>;

    /// Task progress earned by moving from `before` to `after`
    fn progress_gain(&self, before: &EnvironmentState, after: &EnvironmentState) -> f64 {
        let _ = (before, after);
        0.0
    }

    /// Whether `state` ends the episode
    fn is_terminal(&self, state: &EnvironmentState) -> bool {
        let _ = state;
        false
    }
}
