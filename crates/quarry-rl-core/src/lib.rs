//! Core decision-engine traits and types for Quarry
//!
//! This crate provides the foundational abstractions shared by the
//! Q-learning agent, the domain plug-ins and the task lifecycle
//! controller: the error taxonomy, environment state and action payloads,
//! the keys the agent works with, and the contracts for the external
//! actuator, state provider and durable blob storage.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod action;
pub mod agent;
pub mod domain;
pub mod environment;
pub mod error;
pub mod experience;
pub mod reward;
pub mod state;
pub mod storage;

// Re-export core traits and types
pub use action::{Action, ActionKey, ComponentKind};
pub use agent::AgentConfig;
pub use domain::{Domain, DomainKind};
pub use environment::{ActionOutcome, Actuator, StateProvider};
pub use error::{EngineError, Result};
pub use experience::Experience;
pub use reward::Reward;
pub use state::{
    CircuitComponent, CircuitState, EnvironmentState, FarmingState, MiningState,
    NavigationState, Position, StateKey,
};
pub use storage::{BlobStore, FsBlobStore, MemoryBlobStore};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        Action, ActionKey, ActionOutcome, Actuator, AgentConfig, BlobStore, Domain, DomainKind,
        EngineError, EnvironmentState, Experience, Position, Result, Reward, StateKey,
        StateProvider,
    };
}
