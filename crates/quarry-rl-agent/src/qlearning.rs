//! Epsilon-greedy tabular Q-learning with mini-batch experience replay

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use quarry_rl_core::{ActionKey, AgentConfig, Experience, StateKey};

use crate::{DecisionTable, ExperienceBuffer};

/// Summary of one call to [`QLearningAgent::update`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateStats {
    /// Experiences replayed in this update
    pub batch_size: usize,
    /// Mean absolute temporal-difference error over the batch
    pub mean_td_error: f64,
    /// Exploration rate after decay
    pub epsilon: f64,
}

/// Tabular Q-learning agent.
///
/// Owns its decision table and experience buffer. Domain knowledge (state
/// and action encoding, rewards) lives outside, in the optimizer that wraps
/// the agent; here everything is already reduced to keys.
#[derive(Debug, Clone)]
pub struct QLearningAgent {
    config: AgentConfig,
    table: DecisionTable,
    /// Frozen copy used for bootstrapping when `target_update_freq > 0`
    target: Option<DecisionTable>,
    buffer: ExperienceBuffer,
    rng: StdRng,
    updates: u64,
}

impl QLearningAgent {
    /// Create a new agent with an empty table and buffer
    pub fn new(config: AgentConfig) -> quarry_rl_core::Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let target = (config.target_update_freq > 0).then(DecisionTable::new);
        Ok(Self {
            buffer: ExperienceBuffer::new(config.buffer_size),
            table: DecisionTable::new(),
            target,
            config,
            rng,
            updates: 0,
        })
    }

    /// Current configuration, including the decayed epsilon
    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Current exploration rate
    #[must_use]
    pub fn epsilon(&self) -> f64 {
        self.config.epsilon
    }

    /// The live decision table
    #[must_use]
    pub fn table(&self) -> &DecisionTable {
        &self.table
    }

    /// The experience buffer
    #[must_use]
    pub fn buffer(&self) -> &ExperienceBuffer {
        &self.buffer
    }

    /// Number of completed `update` calls
    #[must_use]
    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Value estimate for `(state, action)`, 0 when unseen
    #[must_use]
    pub fn q_value(&self, state: &StateKey, action: &ActionKey) -> f64 {
        self.table.get(state, action)
    }

    /// Maximum action value for a state, or 0 if the state is unseen
    #[must_use]
    pub fn max_value(&self, state: &StateKey) -> f64 {
        self.table.max_value(state)
    }

    /// Pick an action from `candidates` and return its index.
    ///
    /// Explores (uniform over the candidates) with probability epsilon, and
    /// always when none of the candidates has a recorded value for `state`.
    /// Otherwise returns the highest-valued candidate. Ties go to the action
    /// recorded first for this state; candidates without a recorded value
    /// count as 0 and rank after recorded ones on ties.
    ///
    /// Returns `None` only when `candidates` is empty.
    pub fn select_index(&mut self, state: &StateKey, candidates: &[ActionKey]) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }

        let known = self
            .table
            .row(state)
            .filter(|row| candidates.iter().any(|c| row.contains_key(c)));

        let Some(row) = known else {
            trace!(state = %state, "Unseen state, exploring");
            return Some(self.rng.gen_range(0..candidates.len()));
        };

        if self.rng.gen::<f64>() < self.config.epsilon {
            return Some(self.rng.gen_range(0..candidates.len()));
        }

        let mut best: Option<(usize, f64)> = None;
        let recorded = row
            .iter()
            .filter_map(|(action, value)| {
                candidates
                    .iter()
                    .position(|c| c == action)
                    .map(|idx| (idx, *value))
            });
        let unrecorded = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| !row.contains_key(*c))
            .map(|(idx, _)| (idx, 0.0));
        for (idx, value) in recorded.chain(unrecorded) {
            if best.map_or(true, |(_, v)| value > v) {
                best = Some((idx, value));
            }
        }
        best.map(|(idx, _)| idx)
    }

    /// Key-returning form of [`Self::select_index`]
    pub fn select_action<'c>(
        &mut self,
        state: &StateKey,
        candidates: &'c [ActionKey],
    ) -> Option<&'c ActionKey> {
        self.select_index(state, candidates).map(|idx| &candidates[idx])
    }

    /// Record an experience and learn from a replayed mini-batch.
    ///
    /// The batch holds `min(batch_size, buffer len)` experiences drawn with
    /// replacement. Each is applied in turn, so later samples see the
    /// updates made by earlier ones. Epsilon decays once per call.
    pub fn update(&mut self, experience: Experience) -> UpdateStats {
        self.buffer.push(experience);

        let count = self.config.batch_size.min(self.buffer.len());
        let batch = self.buffer.sample(count, &mut self.rng);

        let mut total_error = 0.0;
        for sample in &batch {
            total_error += self.apply(sample).abs();
        }

        self.config.epsilon = (self.config.epsilon * self.config.epsilon_decay)
            .max(self.config.min_epsilon);
        self.updates += 1;

        let freq = self.config.target_update_freq as u64;
        if freq > 0 && self.updates % freq == 0 {
            self.target = Some(self.table.clone());
            debug!(updates = self.updates, "Target table refreshed");
        }

        #[allow(clippy::cast_precision_loss)]
        let mean_td_error = if batch.is_empty() {
            0.0
        } else {
            total_error / batch.len() as f64
        };

        metrics::counter!("quarry_agent_updates_total", 1);
        metrics::histogram!("quarry_agent_td_error", mean_td_error);
        metrics::gauge!("quarry_agent_epsilon", self.config.epsilon);

        UpdateStats {
            batch_size: batch.len(),
            mean_td_error,
            epsilon: self.config.epsilon,
        }
    }

    /// One Bellman backup; returns the TD error
    fn apply(&mut self, experience: &Experience) -> f64 {
        let bootstrap = if experience.is_terminal() {
            0.0
        } else {
            let source = self.target.as_ref().unwrap_or(&self.table);
            self.config.gamma * source.max_value(experience.next_state())
        };
        let target = experience.reward() + bootstrap;
        let current = self.table.get(experience.state(), experience.action());
        let td_error = target - current;
        self.table.set(
            experience.state(),
            experience.action(),
            current + self.config.learning_rate * td_error,
        );
        td_error
    }

    /// Replace the configuration, then clear and repopulate the table and
    /// buffer. Experiences beyond the new capacity evict the oldest.
    ///
    /// The configuration is validated first; on error nothing changes.
    pub fn replace_state(
        &mut self,
        config: AgentConfig,
        table: &DecisionTable,
        experiences: Vec<Experience>,
        updates: u64,
    ) -> quarry_rl_core::Result<()> {
        config.validate()?;

        self.table.clear();
        for (state, row) in table.iter() {
            for (action, value) in row {
                self.table.set(state, action, *value);
            }
        }
        self.buffer.clear(config.buffer_size);
        for experience in experiences {
            self.buffer.push(experience);
        }

        self.target = (config.target_update_freq > 0).then(|| self.table.clone());
        self.config = config;
        self.updates = updates;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn config() -> AgentConfig {
        AgentConfig::default().with_seed(42)
    }

    fn keys(names: &[&str]) -> Vec<ActionKey> {
        names.iter().map(|n| ActionKey::from(*n)).collect()
    }

    #[test]
    fn test_single_terminal_update() {
        let mut agent = QLearningAgent::new(AgentConfig {
            learning_rate: 0.5,
            gamma: 0.9,
            ..config()
        })
        .unwrap();

        let stats = agent.update(Experience::new("s1", "a1", 10.0, "s2", true));

        assert_relative_eq!(agent.q_value(&"s1".into(), &"a1".into()), 5.0);
        assert_eq!(stats.batch_size, 1);
        assert_relative_eq!(stats.mean_td_error, 10.0);
    }

    #[test]
    fn test_bootstrap_from_next_state() {
        let mut agent = QLearningAgent::new(AgentConfig {
            learning_rate: 1.0,
            gamma: 0.5,
            batch_size: 1,
            buffer_size: 1,
            ..config()
        })
        .unwrap();

        agent.update(Experience::new("s2", "a", 4.0, "end", true));
        agent.update(Experience::new("s1", "a", 1.0, "s2", false));

        assert_relative_eq!(agent.q_value(&"s1".into(), &"a".into()), 1.0 + 0.5 * 4.0);
    }

    #[test]
    fn test_epsilon_decays_to_floor() {
        let mut agent = QLearningAgent::new(AgentConfig {
            epsilon: 0.2,
            epsilon_decay: 0.5,
            min_epsilon: 0.05,
            ..config()
        })
        .unwrap();

        let first = agent.update(Experience::new("s", "a", 0.0, "s", false));
        assert_relative_eq!(first.epsilon, 0.1);
        for _ in 0..5 {
            agent.update(Experience::new("s", "a", 0.0, "s", false));
        }
        assert_relative_eq!(agent.epsilon(), 0.05);
    }

    #[test]
    fn test_select_empty_candidates() {
        let mut agent = QLearningAgent::new(config()).unwrap();
        assert!(agent.select_index(&"s".into(), &[]).is_none());
    }

    #[test]
    fn test_exploit_prefers_best_then_first_seen() {
        let mut agent = QLearningAgent::new(AgentConfig {
            epsilon: 0.0,
            min_epsilon: 0.0,
            learning_rate: 1.0,
            batch_size: 1,
            buffer_size: 1,
            ..config()
        })
        .unwrap();

        agent.update(Experience::new("s", "b", 1.0, "t", true));
        agent.update(Experience::new("s", "a", 1.0, "t", true));
        agent.update(Experience::new("s", "c", 0.5, "t", true));

        let candidates = keys(&["a", "b", "c"]);
        // a and b tie; b was recorded first
        assert_eq!(
            agent.select_action(&"s".into(), &candidates).map(ActionKey::as_str),
            Some("b")
        );

        // an unrecorded candidate beats negative values
        agent.update(Experience::new("n", "x", -1.0, "t", true));
        let candidates = keys(&["x", "y"]);
        assert_eq!(agent.select_index(&"n".into(), &candidates), Some(1));
    }

    #[test]
    fn test_target_table_freezes_bootstrap() {
        let mut agent = QLearningAgent::new(AgentConfig {
            learning_rate: 1.0,
            gamma: 1.0,
            batch_size: 1,
            buffer_size: 1,
            target_update_freq: 10,
            ..config()
        })
        .unwrap();

        agent.update(Experience::new("s2", "a", 3.0, "end", true));
        // target table still empty, so s2 bootstraps as 0
        agent.update(Experience::new("s1", "a", 1.0, "s2", false));
        assert_relative_eq!(agent.q_value(&"s1".into(), &"a".into()), 1.0);
    }

    #[test]
    fn test_replace_state_clears_before_repopulating() {
        let mut agent = QLearningAgent::new(config()).unwrap();
        agent.update(Experience::new("old", "a", 3.0, "end", true));

        let mut table = DecisionTable::new();
        table.set(&"new".into(), &"b".into(), 2.5);
        let experiences = vec![
            Experience::new("e1", "a", 1.0, "e2", false),
            Experience::new("e2", "a", 1.0, "e3", false),
            Experience::new("e3", "a", 1.0, "end", true),
        ];
        let replacement = AgentConfig {
            buffer_size: 2,
            ..config()
        };
        agent.replace_state(replacement, &table, experiences, 7).unwrap();

        assert!(!agent.table().contains_state(&"old".into()));
        assert_relative_eq!(agent.q_value(&"new".into(), &"b".into()), 2.5);
        assert_eq!(agent.buffer().capacity(), 2);
        assert_eq!(agent.buffer().len(), 2);
        assert_eq!(agent.buffer().oldest().unwrap().state(), &StateKey::from("e2"));
        assert_eq!(agent.updates(), 7);

        let invalid = AgentConfig {
            learning_rate: 0.0,
            ..config()
        };
        assert!(agent.replace_state(invalid, &DecisionTable::new(), Vec::new(), 0).is_err());
        assert_relative_eq!(agent.q_value(&"new".into(), &"b".into()), 2.5);
    }

    proptest! {
        #[test]
        fn prop_unseen_state_selects_in_set(
            n in 1usize..12,
            epsilon in 0.0f64..=1.0,
            seed in any::<u64>(),
        ) {
            let mut agent = QLearningAgent::new(AgentConfig {
                epsilon,
                min_epsilon: 0.0,
                ..AgentConfig::default().with_seed(seed)
            }).unwrap();
            let candidates: Vec<ActionKey> = (0..n).map(|i| ActionKey::new(format!("a{i}"))).collect();
            let idx = agent.select_index(&"never-seen".into(), &candidates);
            prop_assert!(matches!(idx, Some(i) if i < n));
            prop_assert!(agent.table().is_empty());
        }

        #[test]
        fn prop_zero_reward_zero_gamma_stays_zero(
            alpha in 0.01f64..=1.0,
            steps in proptest::collection::vec((0u8..4, 0u8..3, 0u8..4, any::<bool>()), 1..40),
        ) {
            let mut agent = QLearningAgent::new(AgentConfig {
                learning_rate: alpha,
                gamma: 0.0,
                ..AgentConfig::default().with_seed(1)
            }).unwrap();
            for (s, a, next, terminal) in steps {
                agent.update(Experience::new(
                    format!("s{s}"), format!("a{a}"), 0.0, format!("s{next}"), terminal,
                ));
            }
            for (_, row) in agent.table().iter() {
                for value in row.values() {
                    prop_assert!(value.abs() < 1e-12);
                }
            }
        }
    }
}
