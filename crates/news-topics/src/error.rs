//! Topic error types.

use thiserror::Error;

/// Errors that can occur during topic operations.
#[derive(Debug, Error)]
pub enum TopicsError {
    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] news_storage::StorageError),

    /// Event store error
    #[error("Event error: {0}")]
    Events(#[from] news_events::EventsError),

    /// Embedding error
    #[error("Embedding error: {0}")]
    Embedding(#[from] news_embeddings::EmbeddingError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Topic not found
    #[error("Topic not found: {0}")]
    NotFound(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Clustering input was malformed
    #[error("Clustering error: {0}")]
    Clustering(String),
}

impl TopicsError {
    /// Summary classification of a per-unit failure.
    pub fn item_kind(&self) -> news_types::ItemErrorKind {
        use news_types::ItemErrorKind;
        match self {
            TopicsError::Embedding(_) => ItemErrorKind::Embedding,
            TopicsError::Events(e) => e.item_kind(),
            TopicsError::NotFound(_) | TopicsError::Clustering(_) => ItemErrorKind::Invariant,
            TopicsError::InvalidConfig(_) => ItemErrorKind::DataQuality,
            TopicsError::Storage(_) | TopicsError::Serialization(_) => ItemErrorKind::Storage,
        }
    }
}
