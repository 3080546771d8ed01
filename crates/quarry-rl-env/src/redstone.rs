//! Circuit optimization domain
//!
//! The agent builds a chain of components outward from its position and
//! tries to deliver exactly the target signal strength at the output.

use serde::{Deserialize, Serialize};

use quarry_rl_core::{
    Action, ActionKey, ActionOutcome, CircuitState, ComponentKind, Domain, DomainKind,
    EnvironmentState, Position, Reward, StateKey,
};

use crate::features;

/// Bonus for hitting the target signal exactly
const MATCH_REWARD: f64 = 10.0;
/// Cost of placing one component
const PLACEMENT_COST: f64 = 0.2;

/// Redstone plug-in
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedstoneDomain;

impl RedstoneDomain {
    /// Create a redstone domain
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn gap(s: &CircuitState) -> u8 {
        s.target_signal.abs_diff(s.output_signal)
    }

    fn has_source(s: &CircuitState) -> bool {
        s.components
            .iter()
            .any(|c| matches!(c.kind, ComponentKind::Torch | ComponentKind::Lever))
    }

    /// Where the next component of the chain goes
    fn next_slot(s: &CircuitState) -> Position {
        let last = s.components.last().map_or(s.position, |c| c.position);
        Position::new(last.x + 1, last.y, last.z)
    }
}

fn as_circuit(state: &EnvironmentState) -> Option<&CircuitState> {
    match state {
        EnvironmentState::Circuit(s) => Some(s),
        _ => None,
    }
}

impl Domain for RedstoneDomain {
    fn kind(&self) -> DomainKind {
        DomainKind::Redstone
    }

    fn encode_state(&self, state: &EnvironmentState) -> StateKey {
        let Some(s) = as_circuit(state) else {
            return StateKey::new(format!("redstone:foreign:{}", state.kind()));
        };
        let side = match s.output_signal.cmp(&s.target_signal) {
            std::cmp::Ordering::Less => "under",
            std::cmp::Ordering::Equal => "exact",
            std::cmp::Ordering::Greater => "over",
        };
        let gap = match Self::gap(s) {
            0 => "0",
            1..=3 => "small",
            4..=7 => "mid",
            _ => "large",
        };
        StateKey::new(format!(
            "redstone:{side}:{gap}:src{}:avail{}:n{}",
            u8::from(Self::has_source(s)),
            u8::from(s.components_available > 0),
            features::count_bucket(s.components.len()),
        ))
    }

    fn encode_action(&self, state: &EnvironmentState, action: &Action) -> ActionKey {
        features::action_key(&state.position(), action)
    }

    fn compute_reward(
        &self,
        state: &EnvironmentState,
        action: &Action,
        next_state: &EnvironmentState,
        outcome: &ActionOutcome,
    ) -> Reward {
        let (Some(before), Some(after)) = (as_circuit(state), as_circuit(next_state)) else {
            return Reward::default();
        };
        if !outcome.success {
            return Reward::new(-1.0);
        }

        let mut reward = f64::from(Self::gap(before)) - f64::from(Self::gap(after));
        if matches!(action, Action::PlaceComponent { .. }) {
            reward -= PLACEMENT_COST;
        }
        if Self::gap(after) == 0 && !after.components.is_empty() {
            reward += MATCH_REWARD;
        }
        Reward::new(reward)
    }

    fn candidate_actions(&self, state: &EnvironmentState) -> Vec<Action> {
        let Some(s) = as_circuit(state) else {
            return Vec::new();
        };
        let mut actions = Vec::new();

        if s.components_available > 0 {
            let slot = Self::next_slot(s);
            if !Self::has_source(s) {
                actions.push(Action::PlaceComponent {
                    position: slot,
                    kind: ComponentKind::Torch,
                });
                actions.push(Action::PlaceComponent {
                    position: slot,
                    kind: ComponentKind::Lever,
                });
            } else {
                actions.push(Action::PlaceComponent {
                    position: slot,
                    kind: ComponentKind::Dust,
                });
                actions.push(Action::PlaceComponent {
                    position: slot,
                    kind: ComponentKind::Repeater,
                });
            }
        }
        for lever in s
            .components
            .iter()
            .filter(|c| c.kind == ComponentKind::Lever)
        {
            actions.push(Action::ToggleComponent {
                position: lever.position,
            });
        }
        if actions.is_empty() {
            actions.push(Action::Wait);
        }
        actions
    }

    fn progress_gain(&self, before: &EnvironmentState, after: &EnvironmentState) -> f64 {
        match (as_circuit(before), as_circuit(after)) {
            (Some(b), Some(a)) => {
                (f64::from(Self::gap(b)) - f64::from(Self::gap(a))).max(0.0)
            }
            _ => 0.0,
        }
    }

    fn is_terminal(&self, state: &EnvironmentState) -> bool {
        as_circuit(state).map_or(true, |s| {
            (Self::gap(s) == 0 && !s.components.is_empty()) || s.components_available == 0
        })
    }
}
