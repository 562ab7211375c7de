//! Key encoding and decoding for storage layer.
//!
//! Article key format: `art:{published_ms:013}:{source_id}:{article_id}`
//! - published_ms: milliseconds since Unix epoch, zero-padded to 13 digits
//! - source_id / article_id: the article's natural key
//!
//! The zero-padded timestamp makes lexicographic order equal publish order,
//! so time-range scans are plain forward iteration. Because the publish time
//! is not part of the natural key, a secondary `idx:{source_id}:{article_id}`
//! entry maps each article back to its primary key.

use crate::error::StorageError;

/// Key for article storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleKey {
    /// Publish timestamp in milliseconds
    pub published_ms: i64,
    pub source_id: String,
    pub article_id: String,
}

impl ArticleKey {
    pub fn new(
        published_ms: i64,
        source_id: impl Into<String>,
        article_id: impl Into<String>,
    ) -> Self {
        Self {
            published_ms,
            source_id: source_id.into(),
            article_id: article_id.into(),
        }
    }

    /// Encode key to bytes for storage
    pub fn to_bytes(&self) -> Vec<u8> {
        format!(
            "art:{:013}:{}:{}",
            self.published_ms, self.source_id, self.article_id
        )
        .into_bytes()
    }

    /// Decode key from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = std::str::from_utf8(bytes)
            .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;
        Self::parse(s)
    }

    /// Parse from string format.
    ///
    /// The source id may not contain ':'; the article id may.
    pub fn parse(s: &str) -> Result<Self, StorageError> {
        let mut parts = s.splitn(4, ':');
        if parts.next() != Some("art") {
            return Err(StorageError::Key(format!("Invalid article key format: {}", s)));
        }
        let published_ms: i64 = parts
            .next()
            .ok_or_else(|| StorageError::Key(format!("Missing timestamp: {}", s)))?
            .parse()
            .map_err(|e| StorageError::Key(format!("Invalid timestamp: {}", e)))?;
        let source_id = parts
            .next()
            .ok_or_else(|| StorageError::Key(format!("Missing source: {}", s)))?;
        let article_id = parts
            .next()
            .ok_or_else(|| StorageError::Key(format!("Missing article id: {}", s)))?;

        Ok(Self::new(published_ms, source_id, article_id))
    }

    /// Secondary index key for the natural key
    pub fn index_key(source_id: &str, article_id: &str) -> Vec<u8> {
        format!("idx:{}:{}", source_id, article_id).into_bytes()
    }

    /// Create prefix for time range scan start
    pub fn prefix_start(start_ms: i64) -> Vec<u8> {
        format!("art:{:013}", start_ms).into_bytes()
    }

    /// Create prefix for time range scan end (exclusive)
    pub fn prefix_end(end_ms: i64) -> Vec<u8> {
        format!("art:{:013}", end_ms).into_bytes()
    }
}

/// Key for checkpoint storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointKey {
    /// Checkpoint name (e.g., "event_detection", "event_labeling")
    pub name: String,
}

impl CheckpointKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("checkpoint:{}", self.name).into_bytes()
    }
}
