//! Multi-task runner
//!
//! Runs tasks concurrently on the tokio runtime. Tasks of the same domain
//! share one agent, restored from the newest model version the first time
//! the domain is used, so everything one task learns is visible to the next.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use quarry_rl_agent::{DomainOptimizer, ModelVersionStore, QLearningAgent, SharedAgent};
use quarry_rl_core::{Actuator, BlobStore, DomainKind, EngineError, StateProvider};
use quarry_rl_env::DomainRegistry;

use crate::config::EngineConfig;
use crate::controller::{StopHandle, TaskController, TaskResult};
use crate::progress::ProgressSnapshot;
use crate::task::{Task, TaskParams};
use crate::work::OptimizedWork;

struct RunningTask {
    stop: StopHandle,
    progress: watch::Receiver<ProgressSnapshot>,
    handle: JoinHandle<TaskResult>,
}

/// Submits tasks and tracks them until joined.
///
/// A finished task keeps its entry, and with it its join handle and result,
/// until [`TaskRunner::join`] or [`TaskRunner::reap_finished`] collects it.
/// Long-lived runners that never join should reap periodically.
pub struct TaskRunner {
    config: EngineConfig,
    registry: DomainRegistry,
    store: Arc<dyn BlobStore>,
    agents: DashMap<DomainKind, SharedAgent>,
    versions: DashMap<DomainKind, Arc<ModelVersionStore>>,
    running: DashMap<Uuid, RunningTask>,
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("domains", &self.registry.kinds())
            .field("running", &self.running.len())
            .finish_non_exhaustive()
    }
}

impl TaskRunner {
    /// Create a runner over `registry`, persisting to `store`
    pub fn new(config: EngineConfig, registry: DomainRegistry, store: Arc<dyn BlobStore>) -> Self {
        Self {
            config,
            registry,
            store,
            agents: DashMap::new(),
            versions: DashMap::new(),
            running: DashMap::new(),
        }
    }

    /// Engine configuration in use
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Version history of a domain's model
    #[must_use]
    pub fn model_versions(&self, kind: DomainKind) -> Arc<ModelVersionStore> {
        self.versions
            .entry(kind)
            .or_insert_with(|| {
                Arc::new(
                    ModelVersionStore::new(
                        self.store.clone(),
                        &self.config.storage.model_prefix,
                        kind.as_str(),
                    )
                    .with_keep(self.config.storage.keep_versions),
                )
            })
            .clone()
    }

    /// The shared agent for `kind`, created on first use from the newest
    /// saved version
    pub async fn agent(&self, kind: DomainKind) -> quarry_rl_core::Result<SharedAgent> {
        if let Some(agent) = self.agents.get(&kind) {
            return Ok(agent.clone());
        }

        let agent = SharedAgent::new(QLearningAgent::new(self.config.agent.clone())?);
        match self.model_versions(kind).restore_latest(&agent).await {
            Ok(Some(version)) => info!(domain = %kind, version = version.version, "Agent restored"),
            Ok(None) => info!(domain = %kind, "Starting with an empty decision table"),
            Err(e) => warn!(domain = %kind, error = %e, "Could not restore agent, starting empty"),
        }
        // Another submit may have raced us here; keep whichever landed first
        Ok(self.agents.entry(kind).or_insert(agent).clone())
    }

    /// Start a task against an environment and return its ID
    pub async fn submit(
        &self,
        params: TaskParams,
        actuator: Arc<dyn Actuator>,
        provider: Arc<dyn StateProvider>,
    ) -> quarry_rl_core::Result<Uuid> {
        let kind = params.kind();
        let domain = self.registry.get(kind)?;
        let optimizer = DomainOptimizer::new(domain, self.agent(kind).await?);
        let work = OptimizedWork::new(optimizer, actuator, provider)
            .with_versions(self.model_versions(kind));

        let task = Task::new(params);
        let id = task.id;
        let mut controller = TaskController::new(task, work, self.config.controller.clone())
            .with_progress_store(self.store.clone());
        let stop = controller.stop_handle();
        let progress = controller.subscribe();
        let handle = tokio::spawn(async move { controller.execute().await });

        self.running.insert(
            id,
            RunningTask {
                stop,
                progress,
                handle,
            },
        );
        info!(task_id = %id, domain = %kind, "Task submitted");
        Ok(id)
    }

    /// Latest progress of a task. Falls back to the persisted snapshot for
    /// tasks this runner no longer tracks.
    pub async fn progress(&self, id: Uuid) -> quarry_rl_core::Result<Option<ProgressSnapshot>> {
        if let Some(task) = self.running.get(&id) {
            return Ok(Some(task.progress.borrow().clone()));
        }
        ProgressSnapshot::load(self.store.as_ref(), id).await
    }

    /// Ask a running task to stop. Returns false for unknown tasks.
    pub fn stop(&self, id: Uuid) -> bool {
        match self.running.get(&id) {
            Some(task) => {
                task.stop.stop();
                true
            }
            None => false,
        }
    }

    /// Stop every running task
    pub fn stop_all(&self) {
        for task in self.running.iter() {
            task.stop.stop();
        }
    }

    /// Wait for a task and stop tracking it
    pub async fn join(&self, id: Uuid) -> quarry_rl_core::Result<TaskResult> {
        let (_, task) = self
            .running
            .remove(&id)
            .ok_or_else(|| EngineError::validation(format!("unknown task {id}")))?;
        task.handle
            .await
            .map_err(|e| EngineError::Other(anyhow::anyhow!("task {id} panicked: {e}")))
    }

    /// Collect every task that has finished and stop tracking it.
    /// Results of tasks that panicked are logged and skipped.
    pub async fn reap_finished(&self) -> Vec<TaskResult> {
        let finished: Vec<Uuid> = self
            .running
            .iter()
            .filter(|entry| entry.handle.is_finished())
            .map(|entry| *entry.key())
            .collect();

        let mut results = Vec::with_capacity(finished.len());
        for id in finished {
            let Some((_, task)) = self.running.remove(&id) else {
                continue;
            };
            match task.handle.await {
                Ok(result) => results.push(result),
                Err(e) => warn!(task_id = %id, error = %e, "Task panicked"),
            }
        }
        if !results.is_empty() {
            debug!(reaped = results.len(), "Reaped finished tasks");
        }
        results
    }

    /// IDs and progress of tracked tasks
    #[must_use]
    pub fn list(&self) -> Vec<(Uuid, ProgressSnapshot)> {
        self.running
            .iter()
            .map(|entry| (*entry.key(), entry.progress.borrow().clone()))
            .collect()
    }
}
