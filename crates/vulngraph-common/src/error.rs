//! Error types for VulnGraph

use thiserror::Error;

/// Result type alias for VulnGraph operations
pub type Result<T> = std::result::Result<T, VulnGraphError>;

/// Main error type for VulnGraph
#[derive(Error, Debug)]
pub enum VulnGraphError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
