//! Observed transitions

use serde::{Deserialize, Serialize};

use crate::{ActionKey, StateKey};

/// One observed `(state, action, reward, next state, terminal)` transition.
///
/// Experiences are immutable once created: fields are only readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    state: StateKey,
    action: ActionKey,
    reward: f64,
    next_state: StateKey,
    terminal: bool,
}

impl Experience {
    /// Create a new experience
    pub fn new(
        state: impl Into<StateKey>,
        action: impl Into<ActionKey>,
        reward: f64,
        next_state: impl Into<StateKey>,
        terminal: bool,
    ) -> Self {
        Self {
            state: state.into(),
            action: action.into(),
            reward,
            next_state: next_state.into(),
            terminal,
        }
    }

    /// State the action was taken in
    #[must_use]
    pub fn state(&self) -> &StateKey {
        &self.state
    }

    /// Action taken
    #[must_use]
    pub fn action(&self) -> &ActionKey {
        &self.action
    }

    /// Reward received
    #[must_use]
    pub fn reward(&self) -> f64 {
        self.reward
    }

    /// State observed after the action
    #[must_use]
    pub fn next_state(&self) -> &StateKey {
        &self.next_state
    }

    /// Whether the transition ended the episode
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }
}
