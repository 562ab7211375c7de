//! Embedding model trait and types.
//!
//! Defines the interface for turning article, event and label text into
//! vectors.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::EmbeddingError;

/// Vector embedding - a normalized float array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    /// The embedding vector (normalized to unit length)
    pub values: Vec<f32>,
}

impl Embedding {
    /// Create a new embedding from a vector.
    /// Normalizes the vector to unit length.
    pub fn new(values: Vec<f32>) -> Self {
        let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
        let normalized = if norm > 0.0 {
            values.iter().map(|x| x / norm).collect()
        } else {
            values
        };
        Self { values: normalized }
    }

    /// Create embedding without normalization (for pre-normalized vectors)
    pub fn from_normalized(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Get the embedding dimension
    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Compute cosine similarity with another embedding.
    /// Returns value in [-1, 1] range (1 = identical).
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return 0.0;
        }
        // Since both are normalized, dot product = cosine similarity
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| a * b)
            .sum()
    }
}

/// Model information
#[derive(Debug, Clone)]
pub struct ModelInfo {
    /// Model name (e.g., "all-MiniLM-L6-v2")
    pub name: String,
    /// Embedding dimension
    pub dimension: usize,
    /// Maximum sequence length in tokens
    pub max_sequence_length: usize,
}

/// Trait for embedding models.
///
/// Implementations must be deterministic for a fixed model version and
/// thread-safe (Send + Sync) so they can be shared across pipeline stages.
pub trait EmbeddingModel: Send + Sync {
    /// Get model information
    fn info(&self) -> &ModelInfo;

    /// Generate embedding for a single text.
    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError>;

    /// Generate embeddings for multiple texts (batch).
    /// Default implementation calls embed() for each text.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    /// Generate embeddings for multiple owned strings.
    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        let refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
        self.embed_batch(&refs)
    }

    /// Embed each text independently, keeping per-item failures.
    ///
    /// Tries one batch call first. If the batch fails, falls back to one
    /// call per text so a single bad input only costs that input.
    fn embed_each(&self, texts: &[String]) -> Vec<Result<Embedding, EmbeddingError>> {
        match self.embed_texts(texts) {
            Ok(embeddings) if embeddings.len() == texts.len() => {
                embeddings.into_iter().map(Ok).collect()
            }
            Ok(embeddings) => {
                warn!(
                    expected = texts.len(),
                    actual = embeddings.len(),
                    "Batch returned wrong count, embedding individually"
                );
                texts.iter().map(|t| self.embed(t)).collect()
            }
            Err(e) => {
                warn!(error = %e, count = texts.len(), "Batch embedding failed, embedding individually");
                texts.iter().map(|t| self.embed(t)).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailsOn {
        info: ModelInfo,
        bad: &'static str,
    }

    impl EmbeddingModel for FailsOn {
        fn info(&self) -> &ModelInfo {
            &self.info
        }

        fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
            if text == self.bad {
                Err(EmbeddingError::Transient("device busy".into()))
            } else {
                Ok(Embedding::new(vec![text.len() as f32, 1.0]))
            }
        }
    }

    #[test]
    fn test_embedding_normalization() {
        let emb = Embedding::new(vec![3.0, 4.0]);
        // 3-4-5 triangle: normalized should be [0.6, 0.8]
        assert!((emb.values[0] - 0.6).abs() < 0.001);
        assert!((emb.values[1] - 0.8).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let emb1 = Embedding::new(vec![1.0, 0.0, 0.0]);
        let emb2 = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert!((emb1.cosine_similarity(&emb2) - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let emb1 = Embedding::new(vec![1.0, 0.0]);
        let emb2 = Embedding::new(vec![0.0, 1.0]);
        assert!(emb1.cosine_similarity(&emb2).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_dimension_mismatch() {
        let emb1 = Embedding::new(vec![1.0, 0.0]);
        let emb2 = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert_eq!(emb1.cosine_similarity(&emb2), 0.0);
    }

    #[test]
    fn test_embed_each_isolates_failures() {
        let model = FailsOn {
            info: ModelInfo {
                name: "fails-on".into(),
                dimension: 2,
                max_sequence_length: 16,
            },
            bad: "broken",
        };
        let texts = vec!["ok".to_string(), "broken".to_string(), "fine".to_string()];
        let results = model.embed_each(&texts);

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }
}
