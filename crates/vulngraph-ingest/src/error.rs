//! Error types for the ingestion engine
//!
//! Three levels, from most to least severe:
//!
//! - [`IngestError`] aborts a run (contract violations, hydration failures, bad config)
//! - [`StorageError`] is what a backend reports for one batch write
//! - [`TaskError`] is the recorded outcome of one failed task

use thiserror::Error;
use vulngraph_common::EntityType;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Fatal ingestion error
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Invalid dependency layers: {0}")]
    InvalidLayers(String),

    #[error("Entity type {0} is not assigned to any dependency layer")]
    UnlayeredType(EntityType),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Source error: {0}")]
    Source(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Task scheduler {0} has no running workers")]
    SchedulerClosed(&'static str),

    #[error("Run cancelled")]
    Cancelled,
}

/// Kind of storage constraint that rejected a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    ForeignKey,
    NotNull,
    Check,
}

impl std::fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConstraintKind::Unique => "unique",
            ConstraintKind::ForeignKey => "foreign key",
            ConstraintKind::NotNull => "not null",
            ConstraintKind::Check => "check",
        };
        f.write_str(name)
    }
}

/// Error reported by a storage backend
#[derive(Error, Debug)]
pub enum StorageError {
    /// The batch was rolled back because it broke a table constraint
    #[error("{kind} constraint violation: {detail}")]
    ConstraintViolation { kind: ConstraintKind, detail: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn constraint(kind: ConstraintKind, detail: impl Into<String>) -> Self {
        StorageError::ConstraintViolation {
            kind,
            detail: detail.into(),
        }
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, StorageError::ConstraintViolation { .. })
    }
}

/// Outcome recorded on a failed task
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Retryable by the task function; surfaced here once retries are exhausted
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("task failed: {0}")]
    Failed(String),

    #[error("task cancelled before it started")]
    Cancelled,
}

impl From<StorageError> for TaskError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ConstraintViolation { .. } => TaskError::ConstraintViolation(err.to_string()),
            other => TaskError::Failed(other.to_string()),
        }
    }
}
