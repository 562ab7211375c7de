//! Sentence model files on local disk.
//!
//! The configured repository is mirrored under
//! `<cache_dir>/<owner>_<name>/`. Only files missing from the mirror are
//! fetched from the HuggingFace Hub, so a warm mirror loads offline.

use std::fs;
use std::path::PathBuf;

use hf_hub::api::sync::Api;
use tracing::{debug, info};

use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;

/// Sentence model the pipeline thresholds are calibrated against
pub const DEFAULT_MODEL_REPO: &str = "sentence-transformers/all-MiniLM-L6-v2";

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const WEIGHTS_FILE: &str = "model.safetensors";

/// Local mirror of one model repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFiles {
    pub repo: String,
    pub dir: PathBuf,
}

impl ModelFiles {
    /// Mirror location for the configured repository. Without an explicit
    /// `cache_dir` the platform cache directory is used.
    pub fn for_config(config: &EmbeddingConfig) -> Self {
        let root = config.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from(".cache"))
                .join("news-pulse")
                .join("models")
        });
        Self {
            repo: config.model_repo.clone(),
            dir: root.join(config.model_repo.replace('/', "_")),
        }
    }

    /// Short model name, the last segment of the repository id.
    pub fn model_name(&self) -> &str {
        self.repo.rsplit('/').next().unwrap_or(&self.repo)
    }

    pub fn config(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    pub fn tokenizer(&self) -> PathBuf {
        self.dir.join(TOKENIZER_FILE)
    }

    pub fn weights(&self) -> PathBuf {
        self.dir.join(WEIGHTS_FILE)
    }

    /// Required files not yet present in the mirror.
    pub fn missing(&self) -> Vec<&'static str> {
        [CONFIG_FILE, TOKENIZER_FILE, WEIGHTS_FILE]
            .into_iter()
            .filter(|name| !self.dir.join(name).is_file())
            .collect()
    }

    /// Fetch whatever the mirror lacks.
    pub fn ensure_local(&self) -> Result<(), EmbeddingError> {
        let missing = self.missing();
        if missing.is_empty() {
            debug!(dir = ?self.dir, "Model files present");
            return Ok(());
        }

        info!(repo = %self.repo, files = ?missing, "Fetching model files");
        let api = Api::new().map_err(|e| EmbeddingError::Download(e.to_string()))?;
        let hub = api.model(self.repo.clone());
        fs::create_dir_all(&self.dir)?;

        for name in missing {
            let fetched = hub
                .get(name)
                .map_err(|e| EmbeddingError::Download(format!("{}: {}", name, e)))?;
            fs::copy(&fetched, self.dir.join(name))?;
            debug!(file = name, "Fetched");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_mirror_lives_under_platform_cache() {
        let files = ModelFiles::for_config(&EmbeddingConfig::default());
        assert!(files.dir.ends_with("news-pulse/models/sentence-transformers_all-MiniLM-L6-v2"));
        assert_eq!(files.model_name(), "all-MiniLM-L6-v2");
    }

    #[test]
    fn test_missing_lists_only_absent_files() {
        let temp = TempDir::new().unwrap();
        let config = EmbeddingConfig {
            cache_dir: Some(temp.path().to_path_buf()),
            model_repo: "acme/headline-model".to_string(),
            ..Default::default()
        };
        let files = ModelFiles::for_config(&config);
        assert_eq!(files.dir, temp.path().join("acme_headline-model"));
        assert_eq!(files.missing().len(), 3);

        fs::create_dir_all(&files.dir).unwrap();
        fs::write(files.config(), b"{}").unwrap();
        fs::write(files.tokenizer(), b"{}").unwrap();
        assert_eq!(files.missing(), vec![WEIGHTS_FILE]);

        fs::write(files.weights(), b"x").unwrap();
        assert!(files.missing().is_empty());
        assert!(files.ensure_local().is_ok());
    }
}
