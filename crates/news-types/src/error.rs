//! Error types shared across the pipeline crates.

use thiserror::Error;

/// Errors raised while building or validating domain records.
#[derive(Debug, Error)]
pub enum NewsError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
