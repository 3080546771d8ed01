//! Task execution for Quarry
//!
//! This crate runs long-lived, failure-prone tasks to completion:
//! - the task model and its lifecycle status machine
//! - progress snapshots, persisted for polling and crash recovery
//! - the lifecycle controller with bounded retries, timeouts and stop
//! - RL-driven work that consults and trains a domain optimizer
//! - a multi-task runner sharing one agent per domain
//! - TOML engine configuration and logging setup

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod controller;
pub mod progress;
pub mod runner;
pub mod task;
pub mod telemetry;
pub mod work;

pub use config::{EngineConfig, StorageConfig};
pub use controller::{
    Backoff, ControllerConfig, StepOutcome, StopHandle, TaskController, TaskResult, TaskWork,
};
pub use progress::{ProgressEntry, ProgressSnapshot, ProgressTracker};
pub use runner::TaskRunner;
pub use task::{StatusChange, Task, TaskParams, TaskStatus};
pub use work::OptimizedWork;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        ControllerConfig, EngineConfig, ProgressSnapshot, StopHandle, Task, TaskController,
        TaskParams, TaskResult, TaskRunner, TaskStatus, TaskWork,
    };
    pub use quarry_rl_agent::prelude::*;
}
