//! Model persistence
//!
//! A model is stored as one JSON document:
//!
//! ```json
//! {
//!   "configuration": { "learning_rate": 0.1, ... },
//!   "table": [ { "state": "s1", "actions": [["a1", 5.0]] } ],
//!   "buffer": [ { "state": "s1", "action": "a1", "reward": 10.0, ... } ],
//!   "metadata": { "format_version": 1, "saved_at": "...", "updates": 1 }
//! }
//! ```
//!
//! Table rows and actions keep insertion order, buffer entries keep FIFO
//! order. `metadata` is optional on load; the other three fields are
//! required.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use quarry_rl_core::{ActionKey, AgentConfig, BlobStore, EngineError, Experience, StateKey};

use crate::{DecisionTable, QLearningAgent};

/// Current document layout version
pub const FORMAT_VERSION: u32 = 1;

const REQUIRED_FIELDS: [&str; 3] = ["configuration", "table", "buffer"];

/// One table row, flattened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableEntry {
    /// State key
    pub state: StateKey,
    /// `(action key, value)` pairs in first-seen order
    pub actions: Vec<(ActionKey, f64)>,
}

/// Bookkeeping stored next to the model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelMetadata {
    /// Document layout version
    pub format_version: u32,
    /// When the snapshot was captured
    pub saved_at: Option<DateTime<Utc>>,
    /// Agent updates performed before the snapshot
    pub updates: u64,
    /// Free-form label (task id, domain, operator note)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Flat, order-preserving image of an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    /// Agent configuration, including the decayed epsilon
    pub configuration: AgentConfig,
    /// Decision table rows
    pub table: Vec<TableEntry>,
    /// Experience buffer, oldest first
    pub buffer: Vec<Experience>,
    /// Bookkeeping
    #[serde(default)]
    pub metadata: ModelMetadata,
}

impl ModelSnapshot {
    /// Flatten an agent's configuration, table and buffer
    #[must_use]
    pub fn capture(agent: &QLearningAgent) -> Self {
        let table = agent
            .table()
            .iter()
            .map(|(state, row)| TableEntry {
                state: state.clone(),
                actions: row.iter().map(|(a, v)| (a.clone(), *v)).collect(),
            })
            .collect();
        Self {
            configuration: agent.config().clone(),
            table,
            buffer: agent.buffer().iter().cloned().collect(),
            metadata: ModelMetadata {
                format_version: FORMAT_VERSION,
                saved_at: Some(Utc::now()),
                updates: agent.updates(),
                label: None,
            },
        }
    }

    /// Attach a label
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.metadata.label = Some(label.into());
        self
    }

    /// Rebuild the decision table
    #[must_use]
    pub fn decision_table(&self) -> DecisionTable {
        self.table
            .iter()
            .map(|entry| (entry.state.clone(), entry.actions.clone()))
            .collect()
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> quarry_rl_core::Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parse and validate JSON bytes.
    ///
    /// Fails with [`EngineError::CorruptModel`] when the document is not an
    /// object, a required field is missing, or a field has the wrong shape.
    pub fn from_bytes(bytes: &[u8]) -> quarry_rl_core::Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|e| EngineError::corrupt_model(format!("not valid JSON: {e}")))?;
        let Some(object) = value.as_object() else {
            return Err(EngineError::corrupt_model("model document is not an object"));
        };
        if let Some(missing) = REQUIRED_FIELDS.iter().find(|f| !object.contains_key(**f)) {
            return Err(EngineError::corrupt_model(format!("missing field `{missing}`")));
        }
        let snapshot: Self = serde_json::from_value(value)
            .map_err(|e| EngineError::corrupt_model(e.to_string()))?;
        snapshot
            .configuration
            .validate()
            .map_err(|e| EngineError::corrupt_model(e.to_string()))?;
        Ok(snapshot)
    }

    /// Replace the agent's configuration, table and buffer with this
    /// snapshot. Nothing is merged; entries absent from the snapshot are gone
    /// afterwards.
    pub fn restore_into(self, agent: &mut QLearningAgent) -> quarry_rl_core::Result<()> {
        let table = self.decision_table();
        agent.replace_state(self.configuration, &table, self.buffer, self.metadata.updates)
    }
}

/// Capture `agent` and write it atomically under `key`
pub async fn save(
    agent: &QLearningAgent,
    store: &dyn BlobStore,
    key: &str,
) -> quarry_rl_core::Result<ModelMetadata> {
    let snapshot = ModelSnapshot::capture(agent);
    write(&snapshot, store, key).await?;
    Ok(snapshot.metadata)
}

/// Write an already captured snapshot under `key`
pub async fn write(
    snapshot: &ModelSnapshot,
    store: &dyn BlobStore,
    key: &str,
) -> quarry_rl_core::Result<()> {
    let bytes = snapshot.to_bytes()?;
    store.put(key, &bytes).await?;
    info!(
        key,
        states = snapshot.table.len(),
        experiences = snapshot.buffer.len(),
        "Model saved"
    );
    Ok(())
}

/// Read and validate the model stored under `key`
pub async fn load(store: &dyn BlobStore, key: &str) -> quarry_rl_core::Result<ModelSnapshot> {
    let bytes = store
        .get(key)
        .await?
        .ok_or_else(|| EngineError::persistence(format!("no model stored at {key}")))?;
    let snapshot = ModelSnapshot::from_bytes(&bytes)?;
    debug!(key, states = snapshot.table.len(), "Model loaded");
    Ok(snapshot)
}

/// Full state replacement of `agent` from `snapshot`
pub fn restore(snapshot: ModelSnapshot, agent: &mut QLearningAgent) -> quarry_rl_core::Result<()> {
    snapshot.restore_into(agent)
}
