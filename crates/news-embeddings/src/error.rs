//! Embedding error types.

use thiserror::Error;

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Candle model error
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    /// Tokenizer error
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// Model file not found
    #[error("Model file not found: {0}")]
    ModelNotFound(String),

    /// Download error
    #[error("Failed to download model: {0}")]
    Download(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Provider temporarily unavailable (timeout, busy device, ...)
    #[error("Transient embedding failure: {0}")]
    Transient(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Invalid embedding configuration
    #[error("Invalid embedding config: {0}")]
    InvalidConfig(String),
}

impl EmbeddingError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EmbeddingError::Transient(_) | EmbeddingError::Io(_) | EmbeddingError::Download(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(EmbeddingError::Transient("busy".into()).is_transient());
        assert!(!EmbeddingError::InvalidInput("empty".into()).is_transient());
        assert!(!EmbeddingError::DimensionMismatch {
            expected: 384,
            actual: 3
        }
        .is_transient());
    }
}
