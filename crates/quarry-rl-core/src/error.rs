//! Error types for the decision engine

use std::time::Duration;

use thiserror::Error;

/// Core error type for task execution and learning operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// Bad task or configuration parameters. Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transient failure reported by the environment actuator
    #[error("Actuator error: {0}")]
    Actuator(String),

    /// A step ran past the attempt's time budget
    #[error("Step timed out after {elapsed:?} (budget {budget:?})")]
    Timeout {
        /// Time spent in the attempt when the step returned
        elapsed: Duration,
        /// Configured budget
        budget: Duration,
    },

    /// The retry budget is spent; terminal for the task
    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted {
        /// Total execution attempts made
        attempts: u32,
        /// Message of the error that triggered the final failure
        last_error: String,
    },

    /// Durable storage failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A serialized model is missing fields or cannot be decoded
    #[error("Corrupt model: {0}")]
    CorruptModel(String),

    /// Invalid engine configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The task was stopped by its caller
    #[error("Task cancelled")]
    Cancelled,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// Whether the controller should route this error into the retry path
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Actuator(_)
                | Self::Timeout { .. }
                | Self::Persistence(_)
                | Self::Io(_)
                | Self::Other(_)
        )
    }

    /// Short machine-readable name of the error kind
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Actuator(_) => "actuator",
            Self::Timeout { .. } => "timeout",
            Self::RetryExhausted { .. } => "retry_exhausted",
            Self::Persistence(_) => "persistence",
            Self::CorruptModel(_) => "corrupt_model",
            Self::Config(_) => "config",
            Self::Cancelled => "cancelled",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
            Self::Other(_) => "other",
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an actuator error
    pub fn actuator(message: impl Into<String>) -> Self {
        Self::Actuator(message.into())
    }

    /// Create a persistence error
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    /// Create a corrupt model error
    pub fn corrupt_model(message: impl Into<String>) -> Self {
        Self::CorruptModel(message.into())
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(EngineError::actuator("socket reset").is_retryable());
        assert!(EngineError::Timeout {
            elapsed: Duration::from_secs(71),
            budget: Duration::from_secs(70),
        }
        .is_retryable());
        assert!(EngineError::persistence("disk full").is_retryable());
        assert!(!EngineError::validation("quantity must be positive").is_retryable());
        assert!(!EngineError::corrupt_model("missing table").is_retryable());
        assert!(!EngineError::Cancelled.is_retryable());
    }

    #[test]
    fn test_messages_carry_context() {
        let err = EngineError::RetryExhausted {
            attempts: 3,
            last_error: "Actuator error: block out of reach".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Retries exhausted after 3 attempts: Actuator error: block out of reach"
        );
        assert_eq!(err.kind(), "retry_exhausted");
    }
}
