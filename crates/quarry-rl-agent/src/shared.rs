//! Shared agent handle
//!
//! Tasks of the same domain reuse one agent. Every read and write of the
//! table and buffer goes through the handle's mutex, so suspended tasks
//! never interleave partial updates.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use quarry_rl_core::{ActionKey, Experience, StateKey};

use crate::{ModelSnapshot, QLearningAgent, UpdateStats};

/// Reference-counted, mutex-guarded [`QLearningAgent`]
#[derive(Debug, Clone)]
pub struct SharedAgent {
    inner: Arc<Mutex<QLearningAgent>>,
}

impl SharedAgent {
    /// Wrap an agent
    #[must_use]
    pub fn new(agent: QLearningAgent) -> Self {
        Self {
            inner: Arc::new(Mutex::new(agent)),
        }
    }

    /// Exclusive access for multi-step operations
    pub async fn lock(&self) -> MutexGuard<'_, QLearningAgent> {
        self.inner.lock().await
    }

    /// See [`QLearningAgent::select_index`]
    pub async fn select_index(&self, state: &StateKey, candidates: &[ActionKey]) -> Option<usize> {
        self.inner.lock().await.select_index(state, candidates)
    }

    /// See [`QLearningAgent::update`]
    pub async fn update(&self, experience: Experience) -> UpdateStats {
        self.inner.lock().await.update(experience)
    }

    /// See [`QLearningAgent::max_value`]
    pub async fn max_value(&self, state: &StateKey) -> f64 {
        self.inner.lock().await.max_value(state)
    }

    /// Current exploration rate
    pub async fn epsilon(&self) -> f64 {
        self.inner.lock().await.epsilon()
    }

    /// Capture a persistable snapshot under the lock
    pub async fn snapshot(&self) -> ModelSnapshot {
        ModelSnapshot::capture(&*self.inner.lock().await)
    }

    /// Replace the agent's state with a snapshot
    pub async fn restore(&self, snapshot: ModelSnapshot) -> quarry_rl_core::Result<()> {
        snapshot.restore_into(&mut *self.inner.lock().await)
    }

    /// Whether two handles point at the same agent
    #[must_use]
    pub fn ptr_eq(&self, other: &SharedAgent) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
