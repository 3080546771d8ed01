//! Contracts for the live environment

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Action, EnvironmentState};

/// Result of applying an action through the actuator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// Whether the action had its intended effect
    pub success: bool,
    /// Environment state after the action
    pub state: EnvironmentState,
    /// Free-form detail from the actuator (e.g. why a dig was refused)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ActionOutcome {
    /// Successful outcome
    #[must_use]
    pub fn succeeded(state: EnvironmentState) -> Self {
        Self {
            success: true,
            state,
            detail: None,
        }
    }

    /// Action was refused or had no effect
    pub fn refused(state: EnvironmentState, detail: impl Into<String>) -> Self {
        Self {
            success: false,
            state,
            detail: Some(detail.into()),
        }
    }
}

/// Performs actions against the live environment.
///
/// A call is a suspension point; the controller never pre-empts it.
/// Transient failures (lost connection, server lag) are reported as
/// [`crate::EngineError::Actuator`] and are eligible for retry.
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Apply an action and report the resulting state
    async fn apply(&self, action: &Action) -> crate::Result<ActionOutcome>;
}

/// Supplies the current environment snapshot on demand
#[async_trait]
pub trait StateProvider: Send + Sync {
    /// Current state, queried at every decision point
    async fn current_state(&self) -> crate::Result<EnvironmentState>;
}

#[async_trait]
impl<T> Actuator for Arc<T>
where
    T: Actuator + ?Sized,
{
    async fn apply(&self, action: &Action) -> crate::Result<ActionOutcome> {
        (**self).apply(action).await
    }
}

#[async_trait]
impl<T> StateProvider for Arc<T>
where
    T: StateProvider + ?Sized,
{
    async fn current_state(&self) -> crate::Result<EnvironmentState> {
        (**self).current_state().await
    }
}
