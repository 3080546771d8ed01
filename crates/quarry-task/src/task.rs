//! Task model: identity, parameters, lifecycle status

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use quarry_rl_core::{DomainKind, EngineError, Position};

/// Lifecycle status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, not started
    Pending,
    /// Running; re-entered on every retry
    InProgress,
    /// Goal reached
    Completed,
    /// Validation failed or retries exhausted
    Failed,
    /// Stopped by the caller
    Cancelled,
}

impl TaskStatus {
    /// Whether no further transitions are possible
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `self -> next` is a legal transition
    #[must_use]
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        match self {
            Self::Pending => matches!(
                next,
                Self::InProgress | Self::Failed | Self::Cancelled
            ),
            Self::InProgress => !matches!(next, Self::Pending),
            Self::Completed | Self::Failed | Self::Cancelled => false,
        }
    }
}

impl TaskStatus {
    /// Stable lowercase name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Recognized parameters, one shape per domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "domain", rename_all = "snake_case")]
pub enum TaskParams {
    /// Collect `quantity` blocks of `target_block` within `radius`
    Mining {
        /// Block type to collect
        target_block: String,
        /// Blocks to collect
        quantity: u32,
        /// Search radius in blocks
        radius: u32,
    },
    /// Harvest `quantity` crops within `radius`, replanting as it goes
    Farming {
        /// Crop to maintain
        crop: String,
        /// Crops to harvest
        quantity: u32,
        /// Field radius in blocks
        radius: u32,
    },
    /// Build a circuit delivering `target_signal` at the output
    Redstone {
        /// Wanted output signal strength, 1..=15
        target_signal: u8,
        /// Components the circuit may use
        max_components: u32,
    },
    /// Walk to `destination`
    Navigation {
        /// Where to go
        destination: Position,
        /// Give up beyond this many blocks of straight-line distance
        max_distance: u32,
    },
}

impl TaskParams {
    /// Domain these parameters belong to
    #[must_use]
    pub fn kind(&self) -> DomainKind {
        match self {
            Self::Mining { .. } => DomainKind::Mining,
            Self::Farming { .. } => DomainKind::Farming,
            Self::Redstone { .. } => DomainKind::Redstone,
            Self::Navigation { .. } => DomainKind::Navigation,
        }
    }

    /// Reject absent or out-of-range parameters
    pub fn validate(&self) -> quarry_rl_core::Result<()> {
        match self {
            Self::Mining {
                target_block,
                quantity,
                radius,
            } => {
                require_name("target_block", target_block)?;
                require_positive("quantity", *quantity)?;
                require_positive("radius", *radius)
            }
            Self::Farming {
                crop,
                quantity,
                radius,
            } => {
                require_name("crop", crop)?;
                require_positive("quantity", *quantity)?;
                require_positive("radius", *radius)
            }
            Self::Redstone {
                target_signal,
                max_components,
            } => {
                if !(1..=15).contains(target_signal) {
                    return Err(EngineError::validation(format!(
                        "target_signal must be in 1..=15, got {target_signal}"
                    )));
                }
                require_positive("max_components", *max_components)
            }
            Self::Navigation { max_distance, .. } => require_positive("max_distance", *max_distance),
        }
    }

    /// Progress total known from the parameters alone. Navigation totals
    /// depend on the start position and are resolved when the task starts.
    #[must_use]
    pub fn total_progress(&self) -> Option<f64> {
        match self {
            Self::Mining { quantity, .. } | Self::Farming { quantity, .. } => {
                Some(f64::from(*quantity))
            }
            Self::Redstone { target_signal, .. } => Some(f64::from(*target_signal)),
            Self::Navigation { .. } => None,
        }
    }
}

fn require_positive(field: &str, value: u32) -> quarry_rl_core::Result<()> {
    if value == 0 {
        return Err(EngineError::validation(format!("{field} must be positive")));
    }
    Ok(())
}

fn require_name(field: &str, value: &str) -> quarry_rl_core::Result<()> {
    if value.trim().is_empty() {
        return Err(EngineError::validation(format!("{field} is required")));
    }
    Ok(())
}

/// One entry of the status history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    /// Status entered
    pub status: TaskStatus,
    /// When it was entered
    pub at: DateTime<Utc>,
}

/// A unit of work with bounded retries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task ID
    pub id: Uuid,
    /// Recognized parameters
    pub params: TaskParams,
    status: TaskStatus,
    /// Execution attempts started
    pub attempts: u32,
    /// Retries taken
    pub retry_count: u32,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
    /// Message of the error that ended the task
    pub error: Option<String>,
    history: Vec<StatusChange>,
}

impl Task {
    /// Create a pending task
    #[must_use]
    pub fn new(params: TaskParams) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            params,
            status: TaskStatus::Pending,
            attempts: 0,
            retry_count: 0,
            created_at: now,
            updated_at: now,
            error: None,
            history: vec![StatusChange {
                status: TaskStatus::Pending,
                at: now,
            }],
        }
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Domain of the task
    #[must_use]
    pub fn kind(&self) -> DomainKind {
        self.params.kind()
    }

    /// Every status entered, in order
    #[must_use]
    pub fn history(&self) -> &[StatusChange] {
        &self.history
    }

    /// Statuses entered, in order
    #[must_use]
    pub fn status_trail(&self) -> Vec<TaskStatus> {
        self.history.iter().map(|c| c.status).collect()
    }

    /// Move to `next`, recording it in the history
    pub fn transition(&mut self, next: TaskStatus) -> quarry_rl_core::Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(EngineError::validation(format!(
                "illegal transition {} -> {next}",
                self.status
            )));
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        self.history.push(StatusChange { status: next, at: now });
        Ok(())
    }
}
