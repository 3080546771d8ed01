//! Area maintenance domain: harvest grown crops and replant the farmland

use serde::{Deserialize, Serialize};

use quarry_rl_core::{
    Action, ActionKey, ActionOutcome, Domain, DomainKind, EnvironmentState, FarmingState,
    Position, Reward, StateKey,
};

use crate::features::{self, DEFAULT_REACH};

/// Farming plug-in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FarmingDomain {
    /// How far away a crop can be worked from
    pub reach: f64,
}

impl Default for FarmingDomain {
    fn default() -> Self {
        Self {
            reach: DEFAULT_REACH,
        }
    }
}

impl FarmingDomain {
    /// Create a farming domain with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Nearest plot needing work: mature crops first, then empty farmland
    /// if there are seeds to plant
    fn next_job(s: &FarmingState) -> Option<Position> {
        features::nearest(&s.position, &s.mature_crops).or_else(|| {
            if s.seeds > 0 {
                features::nearest(&s.position, &s.empty_farmland)
            } else {
                None
            }
        })
    }
}

fn as_farming(state: &EnvironmentState) -> Option<&FarmingState> {
    match state {
        EnvironmentState::Farming(s) => Some(s),
        _ => None,
    }
}

impl Domain for FarmingDomain {
    fn kind(&self) -> DomainKind {
        DomainKind::Farming
    }

    fn encode_state(&self, state: &EnvironmentState) -> StateKey {
        let Some(s) = as_farming(state) else {
            return StateKey::new(format!("farming:foreign:{}", state.kind()));
        };
        let job_distance = Self::next_job(s).map(|p| s.position.distance(&p));
        StateKey::new(format!(
            "farming:{}:m{}:e{}:s{}:i{}:j{}",
            s.crop,
            features::count_bucket(s.mature_crops.len()),
            features::count_bucket(s.empty_farmland.len()),
            u8::from(s.seeds > 0),
            features::fill_quarter(s.inventory_used, s.inventory_capacity),
            features::distance_bucket(job_distance, self.reach),
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
        let (Some(before), Some(after)) = (as_farming(state), as_farming(next_state)) else {
            return Reward::default();
        };
        if !outcome.success {
            return Reward::new(-1.0);
        }

        let reward = match action {
            Action::Harvest { .. } => 5.0 * f64::from(after.harvested.saturating_sub(before.harvested)),
            Action::Plant { .. } => {
                if after.empty_farmland.len() < before.empty_farmland.len() {
                    2.0
                } else {
                    -0.5
                }
            }
            Action::MoveTo { .. } => {
                let d0 = Self::next_job(before).map(|p| before.position.distance(&p));
                let d1 = Self::next_job(after).map(|p| after.position.distance(&p));
                match (d0, d1) {
                    (Some(d0), Some(d1)) if d1 < d0 => 0.3,
                    _ => -0.3,
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
        let Some(s) = as_farming(state) else {
            return Vec::new();
        };
        let mut actions = Vec::new();
        let full = s.inventory_used >= s.inventory_capacity;

        if let Some(crop) = features::nearest(&s.position, &s.mature_crops) {
            if s.position.distance(&crop) > self.reach {
                actions.push(Action::MoveTo {
                    position: s.position.step_towards(&crop),
                });
            } else if !full {
                actions.push(Action::Harvest { position: crop });
            }
        }
        if s.seeds > 0 {
            if let Some(plot) = features::nearest(&s.position, &s.empty_farmland) {
                if s.position.distance(&plot) <= self.reach {
                    actions.push(Action::Plant {
                        position: plot,
                        crop: s.crop.clone(),
                    });
                } else {
                    let step = Action::MoveTo {
                        position: s.position.step_towards(&plot),
                    };
                    if !actions.contains(&step) {
                        actions.push(step);
                    }
                }
            }
        }
        if s.inventory_used > 0 {
            actions.push(Action::DepositItems);
        }
        if actions.is_empty() {
            // crops still growing
            actions.push(Action::Wait);
        }
        actions
    }

    fn progress_gain(&self, before: &EnvironmentState, after: &EnvironmentState) -> f64 {
        match (as_farming(before), as_farming(after)) {
            (Some(b), Some(a)) => f64::from(a.harvested.saturating_sub(b.harvested)),
            _ => 0.0,
        }
    }

    fn is_terminal(&self, state: &EnvironmentState) -> bool {
        as_farming(state).map_or(true, |s| {
            s.mature_crops.is_empty() && (s.empty_farmland.is_empty() || s.seeds == 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(mature: Vec<Position>, empty: Vec<Position>, seeds: u32) -> EnvironmentState {
        EnvironmentState::Farming(FarmingState {
            position: Position::new(0, 64, 0),
            crop: "wheat".into(),
            mature_crops: mature,
            empty_farmland: empty,
            seeds,
            inventory_used: 0,
            inventory_capacity: 16,
            harvested: 0,
        })
    }

    #[test]
    fn test_harvest_and_plant_offered_in_reach() {
        let domain = FarmingDomain::new();
        let state = field(vec![Position::new(1, 64, 0)], vec![Position::new(0, 64, 2)], 3);
        let actions = domain.candidate_actions(&state);
        assert_eq!(actions.len(), 2);
        assert!(matches!(actions[0], Action::Harvest { .. }));
        assert!(matches!(actions[1], Action::Plant { ref crop, .. } if crop == "wheat"));
    }

    #[test]
    fn test_waits_while_growing() {
        let domain = FarmingDomain::new();
        let state = field(vec![], vec![Position::new(1, 64, 0)], 0);
        assert_eq!(domain.candidate_actions(&state), vec![Action::Wait]);
        assert!(domain.is_terminal(&state));
    }

    #[test]
    fn test_plant_reward() {
        let domain = FarmingDomain::new();
        let plot = Position::new(1, 64, 0);
        let before = field(vec![], vec![plot], 1);
        let after = field(vec![], vec![], 0);
        let action = Action::Plant {
            position: plot,
            crop: "wheat".into(),
        };
        let reward = domain.compute_reward(&before, &action, &after, &ActionOutcome::succeeded(after.clone()));
        assert!((reward.value() - 2.0).abs() < f64::EPSILON);
    }
}
