//! Error types for the cycle engine

use thiserror::Error;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Errors surfaced by the cycle engine
#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
    /// A cycle or throttle configuration failed validation
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// A cycle id or throttle name is already in use
    #[error("conflict: {what}")]
    Conflict { what: String },

    /// Lookup or delete of an unknown cycle id or throttle name
    #[error("not found: {what}")]
    NotFound { what: String },

    /// The uuid producer failed to open or read from the document store
    #[error("producer failure: {reason}")]
    Producer { reason: String },

    /// The downstream publish failed for a single item
    #[error("publish task failure: {reason}")]
    Task { reason: String },

    /// Cooperative shutdown interrupted the operation
    #[error("operation cancelled")]
    Cancelled,

    /// Metadata checkpoint read or write failed
    #[error("checkpoint failure: {reason}")]
    Checkpoint { reason: String },
}

impl SchedulerError {
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        Self::Conflict { what: what.into() }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn producer(reason: impl Into<String>) -> Self {
        Self::Producer {
            reason: reason.into(),
        }
    }

    pub fn task(reason: impl Into<String>) -> Self {
        Self::Task {
            reason: reason.into(),
        }
    }

    pub fn checkpoint(reason: impl Into<String>) -> Self {
        Self::Checkpoint {
            reason: reason.into(),
        }
    }

    /// Whether the error leaves the cycle able to continue with its next
    /// iteration rather than being rejected at the control surface.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Producer { .. } | Self::Task { .. } | Self::Checkpoint { .. } | Self::Cancelled
        )
    }
}
