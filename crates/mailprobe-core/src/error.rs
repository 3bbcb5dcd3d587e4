//! Error types for the engine.

use thiserror::Error;

use crate::batch::BatchId;

/// Errors surfaced by the control surface and the result store.
///
/// Per-candidate network failures never show up here; they are folded into
/// the [`CheckResult`](crate::CheckResult) of their task.
#[derive(Debug, Error)]
pub enum Error {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No batch with this id is known to the orchestrator.
    #[error("Batch not found: {0}")]
    BatchNotFound(BatchId),

    /// Invalid batch configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An input line could not be parsed.
    #[error("Invalid input line: {0}")]
    InvalidInput(String),

    /// The result store stopped accepting writes.
    #[error("Result store unavailable: {0}")]
    StoreUnavailable(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
