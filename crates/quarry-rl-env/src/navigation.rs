//! Movement domain

use serde::{Deserialize, Serialize};

use quarry_rl_core::{
    Action, ActionKey, ActionOutcome, Domain, DomainKind, EnvironmentState, NavigationState,
    Position, Reward, StateKey,
};

use crate::features;

/// Bonus for arriving at the destination
const ARRIVAL_REWARD: f64 = 10.0;

/// Navigation plug-in: step towards the destination, climbing or side
/// stepping around obstacles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationDomain {
    /// Penalty per move spent standing in water
    pub water_penalty: f64,
}

impl Default for NavigationDomain {
    fn default() -> Self {
        Self { water_penalty: 0.5 }
    }
}

impl NavigationDomain {
    /// Create a navigation domain with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn remaining_bucket(s: &NavigationState) -> &'static str {
        match s.position.manhattan(&s.destination) {
            0 => "0",
            1..=2 => "adjacent",
            3..=8 => "near",
            9..=32 => "mid",
            _ => "far",
        }
    }

    /// Two moves perpendicular to the main heading
    fn side_steps(s: &NavigationState) -> [Position; 2] {
        let p = s.position;
        let ahead = p.step_towards(&s.destination);
        if ahead.x == p.x {
            [
                Position::new(p.x + 1, p.y, p.z),
                Position::new(p.x - 1, p.y, p.z),
            ]
        } else {
            [
                Position::new(p.x, p.y, p.z + 1),
                Position::new(p.x, p.y, p.z - 1),
            ]
        }
    }
}

fn as_navigation(state: &EnvironmentState) -> Option<&NavigationState> {
    match state {
        EnvironmentState::Navigation(s) => Some(s),
        _ => None,
    }
}

impl Domain for NavigationDomain {
    fn kind(&self) -> DomainKind {
        DomainKind::Navigation
    }

    fn encode_state(&self, state: &EnvironmentState) -> StateKey {
        let Some(s) = as_navigation(state) else {
            return StateKey::new(format!("navigation:foreign:{}", state.kind()));
        };
        StateKey::new(format!(
            "navigation:{}:{}:o{}:w{}",
            Self::remaining_bucket(s),
            s.position.direction_to(&s.destination),
            u8::from(s.obstacle_ahead),
            u8::from(s.in_water),
        ))
    }

    fn encode_action(&self, state: &EnvironmentState, action: &Action) -> ActionKey {
        features::action_key(&state.position(), action)
    }

    fn compute_reward(
        &self,
        state: &EnvironmentState,
        _action: &Action,
        next_state: &EnvironmentState,
        outcome: &ActionOutcome,
    ) -> Reward {
        let (Some(before), Some(after)) = (as_navigation(state), as_navigation(next_state)) else {
            return Reward::default();
        };
        if !outcome.success {
            return Reward::new(-1.0);
        }

        let before_left = f64::from(before.position.manhattan(&before.destination));
        let after_left = f64::from(after.position.manhattan(&after.destination));
        let mut reward = before_left - after_left - 0.1;
        if after.in_water {
            reward -= self.water_penalty;
        }
        if after.position == after.destination {
            reward += ARRIVAL_REWARD;
        }
        Reward::new(reward)
    }

    fn candidate_actions(&self, state: &EnvironmentState) -> Vec<Action> {
        let Some(s) = as_navigation(state) else {
            return Vec::new();
        };
        if s.position == s.destination {
            return vec![Action::Wait];
        }

        let ahead = s.position.step_towards(&s.destination);
        let mut actions = Vec::with_capacity(4);
        if s.obstacle_ahead {
            actions.push(Action::MoveTo {
                position: Position::new(ahead.x, ahead.y + 1, ahead.z),
            });
        } else {
            actions.push(Action::MoveTo { position: ahead });
        }
        for side in Self::side_steps(s) {
            actions.push(Action::MoveTo { position: side });
        }
        actions.push(Action::Wait);
        actions
    }

    fn progress_gain(&self, before: &EnvironmentState, after: &EnvironmentState) -> f64 {
        match (as_navigation(before), as_navigation(after)) {
            (Some(b), Some(a)) => {
                let b_left = b.position.manhattan(&b.destination);
                let a_left = a.position.manhattan(&a.destination);
                f64::from(b_left.saturating_sub(a_left))
            }
            _ => 0.0,
        }
    }

    fn is_terminal(&self, state: &EnvironmentState) -> bool {
        as_navigation(state).map_or(true, |s| s.position == s.destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(position: Position, obstacle: bool) -> EnvironmentState {
        EnvironmentState::Navigation(NavigationState {
            position,
            destination: Position::new(5, 64, 0),
            obstacle_ahead: obstacle,
            in_water: false,
            steps_taken: 0,
        })
    }

    #[test]
    fn test_candidates_climb_over_obstacles() {
        let domain = NavigationDomain::new();
        let clear = domain.candidate_actions(&walk(Position::new(0, 64, 0), false));
        assert_eq!(
            clear[0],
            Action::MoveTo {
                position: Position::new(1, 64, 0)
            }
        );

        let blocked_state = walk(Position::new(0, 64, 0), true);
        let blocked = domain.candidate_actions(&blocked_state);
        assert_eq!(
            blocked[0],
            Action::MoveTo {
                position: Position::new(1, 65, 0)
            }
        );
        assert_eq!(domain.encode_action(&blocked_state, &blocked[0]).as_str(), "move:+x^");
        assert_eq!(domain.encode_action(&blocked_state, &blocked[1]).as_str(), "move:+z");
        assert_eq!(blocked.len(), 4);
    }

    #[test]
    fn test_arrival() {
        let domain = NavigationDomain::new();
        let before = walk(Position::new(4, 64, 0), false);
        let after = walk(Position::new(5, 64, 0), false);
        let action = Action::MoveTo {
            position: Position::new(5, 64, 0),
        };
        let reward =
            domain.compute_reward(&before, &action, &after, &ActionOutcome::succeeded(after.clone()));
        assert!((reward.value() - (1.0 - 0.1 + ARRIVAL_REWARD)).abs() < 1e-9);
        assert!(domain.is_terminal(&after));
        assert!((domain.progress_gain(&before, &after) - 1.0).abs() < f64::EPSILON);
        assert_eq!(domain.candidate_actions(&after), vec![Action::Wait]);
    }
}
