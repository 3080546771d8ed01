//! Resource extraction domain

use serde::{Deserialize, Serialize};

use quarry_rl_core::{
    Action, ActionKey, ActionOutcome, Domain, DomainKind, EnvironmentState, MiningState, Reward,
    StateKey,
};

use crate::features::{self, DEFAULT_REACH};

/// Reward for each target block collected
const COLLECT_REWARD: f64 = 10.0;

/// Mining plug-in: walk to the nearest ore, dig it, empty the inventory
/// when it fills up
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningDomain {
    /// How far away a block can be dug from
    pub reach: f64,
    /// Tool durability below which the episode ends
    pub min_durability: f64,
}

impl Default for MiningDomain {
    fn default() -> Self {
        Self {
            reach: DEFAULT_REACH,
            min_durability: 0.0,
        }
    }
}

impl MiningDomain {
    /// Create a mining domain with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn tool_bucket(durability: f64) -> &'static str {
        if durability > 0.5 {
            "ok"
        } else if durability > 0.1 {
            "worn"
        } else {
            "low"
        }
    }

    fn target_distance(state: &MiningState) -> Option<f64> {
        state
            .nearest_target()
            .map(|target| state.position.distance(&target))
    }
}

fn as_mining(state: &EnvironmentState) -> Option<&MiningState> {
    match state {
        EnvironmentState::Mining(s) => Some(s),
        _ => None,
    }
}

impl Domain for MiningDomain {
    fn kind(&self) -> DomainKind {
        DomainKind::Mining
    }

    fn encode_state(&self, state: &EnvironmentState) -> StateKey {
        let Some(s) = as_mining(state) else {
            return StateKey::new(format!("mining:foreign:{}", state.kind()));
        };
        StateKey::new(format!(
            "mining:{}:d{}:i{}:t{}",
            s.target_block,
            features::distance_bucket(Self::target_distance(s), self.reach),
            features::fill_quarter(s.inventory_used, s.inventory_capacity),
            Self::tool_bucket(s.tool_durability),
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
        let (Some(before), Some(after)) = (as_mining(state), as_mining(next_state)) else {
            return Reward::default();
        };
        if !outcome.success {
            return Reward::new(-1.0);
        }

        let reward = match action {
            Action::MineBlock { .. } => {
                let collected = after.collected.saturating_sub(before.collected);
                let wear = (before.tool_durability - after.tool_durability).max(0.0);
                COLLECT_REWARD * f64::from(collected) - 5.0 * wear
            }
            Action::MoveTo { .. } => {
                match (Self::target_distance(before), Self::target_distance(after)) {
                    (Some(d0), Some(d1)) if d1 < d0 => 0.5,
                    _ => -0.5,
                }
            }
            Action::DepositItems => {
                features::deposit_reward(before.inventory_used, before.inventory_capacity)
            }
            _ => -0.1,
        };
        Reward::new(reward).clamped(-10.0, 20.0)
    }

    fn candidate_actions(&self, state: &EnvironmentState) -> Vec<Action> {
        let Some(s) = as_mining(state) else {
            return Vec::new();
        };
        let mut actions = Vec::new();

        if let Some(target) = s.nearest_target() {
            let in_reach = s.position.distance(&target) <= self.reach;
            if !in_reach {
                actions.push(Action::MoveTo {
                    position: s.position.step_towards(&target),
                });
            } else if !s.inventory_full() && s.tool_durability > self.min_durability {
                actions.push(Action::MineBlock { position: target });
            }
        }
        if s.inventory_used > 0 {
            actions.push(Action::DepositItems);
        }
        if actions.is_empty() {
            actions.push(Action::Wait);
        }
        actions
    }

    fn progress_gain(&self, before: &EnvironmentState, after: &EnvironmentState) -> f64 {
        match (as_mining(before), as_mining(after)) {
            (Some(b), Some(a)) => f64::from(a.collected.saturating_sub(b.collected)),
            _ => 0.0,
        }
    }

    fn is_terminal(&self, state: &EnvironmentState) -> bool {
        as_mining(state)
            .map_or(true, |s| s.tool_durability <= self.min_durability || s.nearby_targets.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use quarry_rl_core::Position;

    fn state(position: Position, targets: Vec<Position>, used: u32, collected: u32) -> EnvironmentState {
        EnvironmentState::Mining(MiningState {
            position,
            target_block: "iron_ore".into(),
            nearby_targets: targets,
            inventory_used: used,
            inventory_capacity: 8,
            tool_durability: 1.0,
            biome: "plains".into(),
            collected,
        })
    }

    #[test]
    fn test_candidates_follow_reach() {
        let domain = MiningDomain::new();
        let far = state(Position::new(0, 12, 0), vec![Position::new(10, 12, 0)], 0, 0);
        assert_eq!(
            domain.candidate_actions(&far),
            vec![Action::MoveTo {
                position: Position::new(1, 12, 0)
            }]
        );

        let near = state(Position::new(8, 12, 0), vec![Position::new(10, 12, 0)], 2, 0);
        assert_eq!(
            domain.candidate_actions(&near),
            vec![
                Action::MineBlock {
                    position: Position::new(10, 12, 0)
                },
                Action::DepositItems
            ]
        );

        let full = state(Position::new(8, 12, 0), vec![Position::new(10, 12, 0)], 8, 0);
        assert_eq!(domain.candidate_actions(&full), vec![Action::DepositItems]);
    }

    #[test]
    fn test_reward_and_progress_for_dig() {
        let domain = MiningDomain::new();
        let target = Position::new(1, 12, 0);
        let before = state(Position::new(0, 12, 0), vec![target], 0, 0);
        let after = state(Position::new(0, 12, 0), vec![], 1, 1);
        let action = Action::MineBlock { position: target };
        let outcome = ActionOutcome::succeeded(after.clone());

        assert_relative_eq!(
            domain.compute_reward(&before, &action, &after, &outcome).value(),
            COLLECT_REWARD
        );
        assert_relative_eq!(domain.progress_gain(&before, &after), 1.0);
        assert!(domain.is_terminal(&after));

        let refused = ActionOutcome::refused(before.clone(), "out of reach");
        assert_relative_eq!(
            domain.compute_reward(&before, &action, &before, &refused).value(),
            -1.0
        );
    }

    #[test]
    fn test_encoding_is_position_independent() {
        let domain = MiningDomain::new();
        let a = state(Position::new(0, 12, 0), vec![Position::new(2, 12, 0)], 0, 0);
        let b = state(Position::new(50, 30, 9), vec![Position::new(52, 30, 9)], 0, 4);
        assert_eq!(domain.encode_state(&a), domain.encode_state(&b));
        assert_eq!(domain.encode_state(&a).as_str(), "mining:iron_ore:dreach:i0:tok");

        let step = Action::MoveTo {
            position: Position::new(1, 12, 0),
        };
        assert_eq!(domain.encode_action(&a, &step).as_str(), "move:+x");
    }
}
