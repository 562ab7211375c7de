//! Embedding provider configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EmbeddingError;
use crate::files::DEFAULT_MODEL_REPO;

/// Configuration for the embedding provider and its retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// HuggingFace model repository
    #[serde(default = "default_model_repo")]
    pub model_repo: String,

    /// Root of the local model mirror (defaults to the platform cache dir)
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Attempts per text before the item is skipped
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff interval in milliseconds
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,

    /// Upper bound on total time spent retrying one text
    #[serde(default = "default_max_elapsed_secs")]
    pub max_elapsed_secs: u64,
}

fn default_model_repo() -> String {
    DEFAULT_MODEL_REPO.to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_interval_ms() -> u64 {
    200
}

fn default_max_elapsed_secs() -> u64 {
    10
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_repo: default_model_repo(),
            cache_dir: None,
            max_retries: default_max_retries(),
            initial_interval_ms: default_initial_interval_ms(),
            max_elapsed_secs: default_max_elapsed_secs(),
        }
    }
}

impl EmbeddingConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), EmbeddingError> {
        if self.model_repo.trim().is_empty() {
            return Err(EmbeddingError::InvalidConfig(
                "model_repo must not be empty".to_string(),
            ));
        }
        if self.max_retries == 0 {
            return Err(EmbeddingError::InvalidConfig(
                "max_retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn max_elapsed(&self) -> Duration {
        Duration::from_secs(self.max_elapsed_secs)
    }
}
