//! Unified error handling for the carousel crate
//!
//! Domain errors live with their modules (see [`crate::scheduler::error`]);
//! this module provides the crate-wide [`Error`] enum that wraps them
//! together with the common infrastructure failures, plus the [`Result`]
//! alias used at module boundaries.

use std::io;
use thiserror::Error;

pub use crate::scheduler::error::SchedulerError;

/// Unified error type for the carousel crate
#[derive(Error, Debug)]
pub enum Error {
    /// Cycle engine errors
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
