//! Event engine error types.

use thiserror::Error;

/// Errors that can occur during event operations.
///
/// Per-unit failures inside a run are recorded in the run summary instead of
/// being returned; only failures that prevent a run from starting surface
/// as `Err`.
#[derive(Debug, Error)]
pub enum EventsError {
    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] news_storage::StorageError),

    /// Embedding error
    #[error("Embedding error: {0}")]
    Embedding(#[from] news_embeddings::EmbeddingError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Event not found
    #[error("Event not found: {0}")]
    NotFound(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Article source failed
    #[error("Article source error: {0}")]
    Source(String),

    /// A unit of work found state it cannot act on
    #[error("Invariant violated: {0}")]
    Invariant(String),
}

impl EventsError {
    /// Summary classification of a per-unit failure.
    pub fn item_kind(&self) -> news_types::ItemErrorKind {
        use news_types::ItemErrorKind;
        match self {
            EventsError::Embedding(_) => ItemErrorKind::Embedding,
            EventsError::NotFound(_) | EventsError::Invariant(_) => ItemErrorKind::Invariant,
            EventsError::InvalidConfig(_) | EventsError::Source(_) => ItemErrorKind::DataQuality,
            EventsError::Storage(_) | EventsError::Serialization(_) => ItemErrorKind::Storage,
        }
    }
}
