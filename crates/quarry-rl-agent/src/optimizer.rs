//! Domain-injected optimizer
//!
//! Binds one [`Domain`] plug-in to a [`SharedAgent`]. The domain turns
//! environment states and actions into keys and rewards; the agent learns
//! over the keys.

use std::sync::Arc;

use tracing::trace;

use quarry_rl_core::{
    Action, ActionKey, ActionOutcome, Domain, DomainKind, EnvironmentState, Experience, Reward,
};

use crate::{SharedAgent, UpdateStats};

/// What the optimizer learned from one applied action
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Feedback {
    /// Reward computed by the domain
    pub reward: Reward,
    /// Whether the resulting state ends the episode
    pub terminal: bool,
    /// Task progress earned by the transition
    pub progress: f64,
    /// Agent update statistics
    pub stats: UpdateStats,
}

/// A Q-learning agent configured with one domain's encoders and rewards
#[derive(Clone)]
pub struct DomainOptimizer {
    domain: Arc<dyn Domain>,
    agent: SharedAgent,
}

impl std::fmt::Debug for DomainOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainOptimizer")
            .field("domain", &self.domain.kind())
            .finish_non_exhaustive()
    }
}

impl DomainOptimizer {
    /// Create an optimizer around a shared agent
    pub fn new(domain: Arc<dyn Domain>, agent: SharedAgent) -> Self {
        Self { domain, agent }
    }

    /// Domain this optimizer serves
    #[must_use]
    pub fn kind(&self) -> DomainKind {
        self.domain.kind()
    }

    /// The domain plug-in
    #[must_use]
    pub fn domain(&self) -> &Arc<dyn Domain> {
        &self.domain
    }

    /// The shared agent
    #[must_use]
    pub fn agent(&self) -> &SharedAgent {
        &self.agent
    }

    /// Choose the next action for `state`, or `None` if the domain offers
    /// no candidates
    pub async fn choose(&self, state: &EnvironmentState) -> Option<Action> {
        let mut candidates = self.domain.candidate_actions(state);
        let keys: Vec<ActionKey> = candidates
            .iter()
            .map(|a| self.domain.encode_action(state, a))
            .collect();
        let state_key = self.domain.encode_state(state);

        let idx = self.agent.select_index(&state_key, &keys).await?;
        trace!(domain = %self.kind(), state = %state_key, action = %keys[idx], "Action selected");
        Some(candidates.swap_remove(idx))
    }

    /// Feed the observed transition back into the agent
    pub async fn observe(
        &self,
        state: &EnvironmentState,
        action: &Action,
        outcome: &ActionOutcome,
    ) -> Feedback {
        let next = &outcome.state;
        let reward = self.domain.compute_reward(state, action, next, outcome);
        let terminal = self.domain.is_terminal(next);
        let progress = self.domain.progress_gain(state, next);

        let experience = Experience::new(
            self.domain.encode_state(state),
            self.domain.encode_action(state, action),
            reward.value(),
            self.domain.encode_state(next),
            terminal,
        );
        let stats = self.agent.update(experience).await;

        Feedback {
            reward,
            terminal,
            progress,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QLearningAgent;
    use quarry_rl_core::{AgentConfig, NavigationState, Position, StateKey};

    /// Walk along x; reward 1 for getting closer
    struct LineWalk;

    fn nav(x: i32) -> EnvironmentState {
        EnvironmentState::Navigation(NavigationState {
            position: Position::new(x, 0, 0),
            destination: Position::new(3, 0, 0),
            obstacle_ahead: false,
            in_water: false,
            steps_taken: 0,
        })
    }

    impl Domain for LineWalk {
        fn kind(&self) -> DomainKind {
            DomainKind::Navigation
        }

        fn encode_state(&self, state: &EnvironmentState) -> StateKey {
            StateKey::new(format!("x={}", state.position().x))
        }

        fn encode_action(&self, state: &EnvironmentState, action: &Action) -> ActionKey {
            let from = state.position();
            let to = action.target().unwrap_or(from);
            ActionKey::new(format!("{}:{}", action.name(), from.direction_to(&to)))
        }

        fn compute_reward(
            &self,
            state: &EnvironmentState,
            _action: &Action,
            next: &EnvironmentState,
            _outcome: &ActionOutcome,
        ) -> Reward {
            Reward::new(f64::from(next.position().x - state.position().x))
        }

        fn candidate_actions(&self, state: &EnvironmentState) -> Vec<Action> {
            let p = state.position();
            vec![
                Action::MoveTo {
                    position: Position::new(p.x - 1, 0, 0),
                },
                Action::MoveTo {
                    position: Position::new(p.x + 1, 0, 0),
                },
            ]
        }

        fn is_terminal(&self, state: &EnvironmentState) -> bool {
            state.position().x >= 3
        }
    }

    #[tokio::test]
    async fn test_choose_and_observe() {
        let agent = SharedAgent::new(
            QLearningAgent::new(AgentConfig::default().with_seed(11)).unwrap(),
        );
        let optimizer = DomainOptimizer::new(Arc::new(LineWalk), agent.clone());

        let start = nav(2);
        let action = optimizer.choose(&start).await.unwrap();
        assert!(matches!(action, Action::MoveTo { .. }));

        let forward = Action::MoveTo {
            position: Position::new(3, 0, 0),
        };
        let outcome = ActionOutcome::succeeded(nav(3));
        let feedback = optimizer.observe(&start, &forward, &outcome).await;

        assert!(feedback.terminal);
        assert!((feedback.reward.value() - 1.0).abs() < f64::EPSILON);
        let q = agent
            .lock()
            .await
            .q_value(&"x=2".into(), &"move_to:+x".into());
        assert!((q - 0.1).abs() < 1e-12);
    }
}
