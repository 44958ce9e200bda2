//! Error Types
//!
//! Errors raised synchronously to the caller. Node-level failures are not
//! errors: they are recorded in the execution trace and reported through
//! [`RunResult`](crate::execution::RunResult).

use thiserror::Error;

/// Errors produced by graph edits, pre-run checks, persistence and I/O.
#[derive(Debug, Error)]
pub enum Error {
    /// A graph edit was rejected before any mutation happened.
    #[error("validation error: {0}")]
    Validation(String),

    /// The workflow does not satisfy the preconditions for running.
    #[error("structural error: {0}")]
    Structural(String),

    /// A store lookup found nothing under the given id.
    #[error("workflow '{0}' not found")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn structural(message: impl Into<String>) -> Self {
        Self::Structural(message.into())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
