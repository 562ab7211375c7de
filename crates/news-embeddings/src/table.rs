//! Lookup-table embedder.
//!
//! Maps known texts to fixed vectors so similarity values are exact. Used for
//! fixtures and offline replays where loading the real model is not wanted.
//!
//! Resolution order for a text:
//! 1. exact entry
//! 2. first substring rule whose needle occurs in the text
//! 3. a pseudo-random vector seeded from the text (if a fallback is enabled)

use std::collections::HashMap;

use crate::error::EmbeddingError;
use crate::model::{Embedding, EmbeddingModel, ModelInfo};

/// Deterministic embedder backed by a text -> vector table.
#[derive(Debug, Clone)]
pub struct TableEmbedder {
    info: ModelInfo,
    exact: HashMap<String, Vec<f32>>,
    rules: Vec<(String, Vec<f32>)>,
    hashed_fallback: bool,
}

impl TableEmbedder {
    /// Create an empty table for vectors of `dimension` components.
    pub fn new(dimension: usize) -> Self {
        Self {
            info: ModelInfo {
                name: "lookup-table".to_string(),
                dimension,
                max_sequence_length: usize::MAX,
            },
            exact: HashMap::new(),
            rules: Vec::new(),
            hashed_fallback: false,
        }
    }

    /// Map an exact text to a vector.
    pub fn with_text(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.exact.insert(text.into(), vector);
        self
    }

    /// Map any text containing `needle` to a vector.
    pub fn with_rule(mut self, needle: impl Into<String>, vector: Vec<f32>) -> Self {
        self.rules.push((needle.into(), vector));
        self
    }

    /// Give unknown texts a pseudo-random vector instead of failing.
    ///
    /// Seeded vectors for distinct texts are nearly orthogonal in high
    /// dimensions.
    pub fn with_hashed_fallback(mut self) -> Self {
        self.hashed_fallback = true;
        self
    }

    /// Unit vector along `axis`.
    pub fn axis(dimension: usize, axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; dimension];
        if axis < dimension {
            v[axis] = 1.0;
        }
        v
    }

    /// Unit vector whose cosine similarity with `axis(base)` is exactly `cos`.
    ///
    /// The remainder lies along `axis(other)`, so two blends that share
    /// `base` but use different `other` axes have similarity `cos * cos`.
    pub fn blend(dimension: usize, base: usize, other: usize, cos: f32) -> Vec<f32> {
        let mut v = vec![0.0; dimension];
        if base < dimension {
            v[base] = cos;
        }
        if other < dimension {
            v[other] = (1.0 - cos * cos).max(0.0).sqrt();
        }
        v
    }

    fn hashed(&self, text: &str) -> Vec<f32> {
        // FNV-1a seed, xorshift stream
        let mut state: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in text.as_bytes() {
            state ^= u64::from(*byte);
            state = state.wrapping_mul(0x0100_0000_01b3);
        }
        (0..self.info.dimension)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                ((state >> 40) as f32 / (1u64 << 24) as f32) * 2.0 - 1.0
            })
            .collect()
    }

    fn lookup(&self, text: &str) -> Option<Vec<f32>> {
        if let Some(v) = self.exact.get(text) {
            return Some(v.clone());
        }
        self.rules
            .iter()
            .find(|(needle, _)| text.contains(needle.as_str()))
            .map(|(_, v)| v.clone())
    }
}

impl EmbeddingModel for TableEmbedder {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let values = match self.lookup(text) {
            Some(v) => v,
            None if self.hashed_fallback => self.hashed(text),
            None => {
                return Err(EmbeddingError::InvalidInput(format!(
                    "no table entry for {:?}",
                    text
                )))
            }
        };

        if values.len() != self.info.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.info.dimension,
                actual: values.len(),
            });
        }
        Ok(Embedding::new(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_then_rule() {
        let model = TableEmbedder::new(3)
            .with_text("bank", TableEmbedder::axis(3, 0))
            .with_rule("bakery", TableEmbedder::axis(3, 1));

        let bank = model.embed("bank").unwrap();
        let bakery = model.embed("Local bakery opens").unwrap();
        assert!(bank.cosine_similarity(&bakery).abs() < 1e-6);
        assert!(model.embed("unknown").is_err());
    }

    #[test]
    fn test_blend_has_exact_similarity() {
        let a = Embedding::new(TableEmbedder::axis(4, 0));
        let b = Embedding::new(TableEmbedder::blend(4, 0, 1, 0.9));
        let c = Embedding::new(TableEmbedder::blend(4, 0, 2, 0.9));
        assert!((a.cosine_similarity(&b) - 0.9).abs() < 1e-5);
        assert!((b.cosine_similarity(&c) - 0.81).abs() < 1e-5);
    }

    #[test]
    fn test_hashed_fallback_is_deterministic() {
        let model = TableEmbedder::new(64).with_hashed_fallback();
        let first = model.embed("Some headline").unwrap();
        let second = model.embed("Some headline").unwrap();
        let other = model.embed("Another story entirely").unwrap();
        assert_eq!(first, second);
        assert!(first.cosine_similarity(&other) < 0.7);
    }

    #[test]
    fn test_dimension_mismatch() {
        let model = TableEmbedder::new(3).with_text("x", vec![1.0, 0.0]);
        assert!(matches!(
            model.embed("x"),
            Err(EmbeddingError::DimensionMismatch { .. })
        ));
    }
}
