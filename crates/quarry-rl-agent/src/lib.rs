//! Tabular Q-learning for Quarry
//!
//! This crate provides the learning half of the decision engine:
//! - the insertion-ordered decision table
//! - a fixed-capacity FIFO experience buffer
//! - the epsilon-greedy Q-learning agent with mini-batch replay
//! - a mutex-guarded shared handle and the domain-injected optimizer
//! - model persistence, versioning and rollback

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod buffer;
pub mod optimizer;
pub mod persistence;
pub mod qlearning;
pub mod shared;
pub mod table;
pub mod versions;

pub use buffer::ExperienceBuffer;
pub use optimizer::{DomainOptimizer, Feedback};
pub use persistence::{ModelMetadata, ModelSnapshot, TableEntry};
pub use qlearning::{QLearningAgent, UpdateStats};
pub use shared::SharedAgent;
pub use table::DecisionTable;
pub use versions::{ModelVersion, ModelVersionStore};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        DecisionTable, DomainOptimizer, ExperienceBuffer, ModelSnapshot, ModelVersionStore,
        QLearningAgent, SharedAgent, UpdateStats,
    };
    pub use quarry_rl_core::prelude::*;
}
