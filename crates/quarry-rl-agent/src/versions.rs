//! Numbered model versions with rollback
//!
//! Versions live under `<prefix>/<model>/v000001`, `v000002`, ... next to an
//! `index` blob listing them. Version numbers only grow; pruning removes old
//! versions but never reuses their numbers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use quarry_rl_core::{BlobStore, EngineError};

use crate::persistence::{self, ModelSnapshot};
use crate::SharedAgent;

/// One saved version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    /// Monotonic version number, starting at 1
    pub version: u32,
    /// Blob key holding the snapshot
    pub key: String,
    /// When the version was written
    pub created_at: DateTime<Utc>,
    /// Agent updates at capture time
    pub updates: u64,
    /// States in the table at capture time
    pub states: usize,
    /// Optional label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct VersionIndex {
    next: u32,
    versions: Vec<ModelVersion>,
}

/// Version history for one named model
pub struct ModelVersionStore {
    store: Arc<dyn BlobStore>,
    base: String,
    keep: usize,
    /// Serializes index read-modify-write cycles
    index_lock: Mutex<()>,
}

impl std::fmt::Debug for ModelVersionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelVersionStore")
            .field("base", &self.base)
            .field("keep", &self.keep)
            .finish_non_exhaustive()
    }
}

impl ModelVersionStore {
    /// Versions of `model` stored under `prefix`
    pub fn new(store: Arc<dyn BlobStore>, prefix: &str, model: &str) -> Self {
        let prefix = prefix.trim_end_matches('/');
        Self {
            store,
            base: format!("{prefix}/{model}"),
            keep: 0,
            index_lock: Mutex::new(()),
        }
    }

    /// Keep at most `keep` versions after every save; 0 keeps everything
    #[must_use]
    pub fn with_keep(mut self, keep: usize) -> Self {
        self.keep = keep;
        self
    }

    fn index_key(&self) -> String {
        format!("{}/index", self.base)
    }

    fn version_key(&self, version: u32) -> String {
        format!("{}/v{version:06}", self.base)
    }

    async fn read_index(&self) -> quarry_rl_core::Result<VersionIndex> {
        match self.store.get(&self.index_key()).await? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                EngineError::corrupt_model(format!("version index {}: {e}", self.index_key()))
            }),
            None => Ok(VersionIndex {
                next: 1,
                versions: Vec::new(),
            }),
        }
    }

    async fn write_index(&self, index: &VersionIndex) -> quarry_rl_core::Result<()> {
        let bytes = serde_json::to_vec_pretty(index)?;
        self.store.put(&self.index_key(), &bytes).await
    }

    /// Write `snapshot` as the next version
    pub async fn save_version(
        &self,
        snapshot: &ModelSnapshot,
    ) -> quarry_rl_core::Result<ModelVersion> {
        let _guard = self.index_lock.lock().await;
        let mut index = self.read_index().await?;

        let version = index.next.max(1);
        let key = self.version_key(version);
        persistence::write(snapshot, self.store.as_ref(), &key).await?;

        let entry = ModelVersion {
            version,
            key,
            created_at: snapshot.metadata.saved_at.unwrap_or_else(Utc::now),
            updates: snapshot.metadata.updates,
            states: snapshot.table.len(),
            label: snapshot.metadata.label.clone(),
        };
        index.next = version + 1;
        index.versions.push(entry.clone());
        self.write_index(&index).await?;
        info!(model = %self.base, version, "Model version saved");

        if self.keep > 0 {
            self.prune_locked(&mut index, self.keep).await?;
        }
        Ok(entry)
    }

    /// Capture a shared agent and save it as the next version
    pub async fn checkpoint(
        &self,
        agent: &SharedAgent,
        label: Option<&str>,
    ) -> quarry_rl_core::Result<ModelVersion> {
        let mut snapshot = agent.snapshot().await;
        snapshot.metadata.label = label.map(str::to_string);
        self.save_version(&snapshot).await
    }

    /// Saved versions, oldest first
    pub async fn list_versions(&self) -> quarry_rl_core::Result<Vec<ModelVersion>> {
        Ok(self.read_index().await?.versions)
    }

    /// Newest saved version
    pub async fn latest(&self) -> quarry_rl_core::Result<Option<ModelVersion>> {
        Ok(self.read_index().await?.versions.pop())
    }

    /// Load the snapshot stored as `version`
    pub async fn load_version(&self, version: u32) -> quarry_rl_core::Result<ModelSnapshot> {
        let index = self.read_index().await?;
        let entry = index
            .versions
            .iter()
            .find(|v| v.version == version)
            .ok_or_else(|| {
                EngineError::persistence(format!("{} has no version {version}", self.base))
            })?;
        persistence::load(self.store.as_ref(), &entry.key).await
    }

    /// Reload `version` into the in-memory agent.
    ///
    /// Only the agent's table, buffer and configuration go back; actions
    /// already taken in the environment stay taken. Later versions are kept
    /// in the store.
    pub async fn rollback(
        &self,
        agent: &SharedAgent,
        version: u32,
    ) -> quarry_rl_core::Result<ModelSnapshot> {
        let snapshot = self.load_version(version).await?;
        agent.restore(snapshot.clone()).await?;
        warn!(model = %self.base, version, "Model rolled back");
        metrics::counter!("quarry_model_rollbacks_total", 1);
        Ok(snapshot)
    }

    /// Restore the newest version into `agent`, if any exists
    pub async fn restore_latest(
        &self,
        agent: &SharedAgent,
    ) -> quarry_rl_core::Result<Option<ModelVersion>> {
        let Some(latest) = self.latest().await? else {
            return Ok(None);
        };
        self.rollback(agent, latest.version).await?;
        Ok(Some(latest))
    }

    /// Delete all but the newest `keep` versions; returns the removed numbers
    pub async fn prune(&self, keep: usize) -> quarry_rl_core::Result<Vec<u32>> {
        let _guard = self.index_lock.lock().await;
        let mut index = self.read_index().await?;
        self.prune_locked(&mut index, keep).await
    }

    async fn prune_locked(
        &self,
        index: &mut VersionIndex,
        keep: usize,
    ) -> quarry_rl_core::Result<Vec<u32>> {
        if index.versions.len() <= keep {
            return Ok(Vec::new());
        }
        let excess = index.versions.len() - keep;
        let removed: Vec<ModelVersion> = index.versions.drain(..excess).collect();
        self.write_index(index).await?;
        for version in &removed {
            self.store.delete(&version.key).await?;
        }
        let numbers: Vec<u32> = removed.iter().map(|v| v.version).collect();
        info!(model = %self.base, removed = ?numbers, "Pruned model versions");
        Ok(numbers)
    }
}
