//! # news-embeddings
//!
//! Sentence embeddings for the news event pipeline.
//!
//! Every similarity decision in the pipeline (grouping articles, merging
//! events, labeling, topic clustering) compares vectors produced by one
//! [`EmbeddingModel`]. Thresholds are calibrated against all-MiniLM-L6-v2 and
//! must be re-tuned if the model changes.
//!
//! ## Features
//! - Local inference via Candle (no external API)
//! - all-MiniLM-L6-v2 model (384 dimensions)
//! - Local model mirror, filled from the HuggingFace Hub on first use
//! - Exponential-backoff retry wrapper for transient failures
//! - A lookup-table embedder for deterministic fixtures

pub mod candle;
pub mod config;
pub mod error;
pub mod files;
pub mod model;
pub mod retry;
pub mod table;

pub use crate::candle::CandleEmbedder;
pub use config::EmbeddingConfig;
pub use error::EmbeddingError;
pub use files::{ModelFiles, DEFAULT_MODEL_REPO};
pub use model::{Embedding, EmbeddingModel, ModelInfo};
pub use retry::RetryingEmbedder;
pub use table::TableEmbedder;
