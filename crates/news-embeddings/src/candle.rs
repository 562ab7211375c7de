//! Sentence embeddings with Candle.
//!
//! Runs a BERT sentence model on CPU and mean-pools the token states of each
//! text into one vector.

use std::fs;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::{Encoding, Tokenizer};
use tracing::{debug, info};

use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;
use crate::files::ModelFiles;
use crate::model::{Embedding, EmbeddingModel, ModelInfo};

/// Output width of all-MiniLM-L6-v2
pub const EMBEDDING_DIM: usize = 384;

/// Tokens kept per text. A headline plus standfirst fits well within it.
pub const MAX_SEQ_LENGTH: usize = 256;

/// Sentence embedder backed by a local BERT model.
pub struct CandleEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    info: ModelInfo,
}

impl CandleEmbedder {
    /// Load the configured model, fetching missing files first.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        config.validate()?;
        let files = ModelFiles::for_config(config);
        files.ensure_local()?;
        Self::from_files(&files)
    }

    fn from_files(files: &ModelFiles) -> Result<Self, EmbeddingError> {
        let device = Device::Cpu;

        let bert_config: BertConfig = serde_json::from_str(&fs::read_to_string(files.config())?)
            .map_err(|e| EmbeddingError::ModelNotFound(format!("{}: {}", files.repo, e)))?;
        let tokenizer = Tokenizer::from_file(files.tokenizer())
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

        // SAFETY: the mirror directory is only written by `ensure_local`,
        // which has returned before the weights are mapped.
        let weights = unsafe {
            VarBuilder::from_mmaped_safetensors(&[files.weights()], DType::F32, &device)?
        };
        let model = BertModel::load(weights, &bert_config)?;

        info!(model = %files.model_name(), dim = EMBEDDING_DIM, "Embedding model ready");
        Ok(Self {
            model,
            tokenizer,
            device,
            info: ModelInfo {
                name: files.model_name().to_string(),
                dimension: EMBEDDING_DIM,
                max_sequence_length: MAX_SEQ_LENGTH,
            },
        })
    }

    /// Token ids and attention mask, right-padded to the longest text.
    fn encode(&self, encodings: &[Encoding]) -> Result<(Tensor, Tensor), EmbeddingError> {
        let width = encodings
            .iter()
            .map(|e| e.get_ids().len().min(MAX_SEQ_LENGTH))
            .max()
            .unwrap_or(0);

        let mut ids = Vec::with_capacity(encodings.len() * width);
        let mut mask = Vec::with_capacity(encodings.len() * width);
        for encoding in encodings {
            let len = encoding.get_ids().len().min(width);
            ids.extend_from_slice(&encoding.get_ids()[..len]);
            mask.extend_from_slice(&encoding.get_attention_mask()[..len]);
            ids.resize(ids.len() + width - len, 0u32);
            mask.resize(mask.len() + width - len, 0u32);
        }

        let shape = (encodings.len(), width);
        Ok((
            Tensor::from_vec(ids, shape, &self.device)?,
            Tensor::from_vec(mask, shape, &self.device)?,
        ))
    }
}

/// Average the token states of each row, ignoring padding.
fn mean_pool(states: &Tensor, mask: &Tensor) -> Result<Tensor, EmbeddingError> {
    let weights = mask
        .unsqueeze(2)?
        .broadcast_as(states.shape())?
        .to_dtype(DType::F32)?;
    let totals = states.broadcast_mul(&weights)?.sum(1)?;
    let counts = weights.sum(1)?.clamp(1e-9, f64::MAX)?;
    Ok(totals.broadcast_div(&counts)?)
}

impl EmbeddingModel for CandleEmbedder {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.embed_batch(&[text])?
            .pop()
            .ok_or_else(|| EmbeddingError::InvalidInput("empty batch result".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(pos) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput(format!(
                "text at position {} is empty",
                pos
            )));
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;
        let (ids, mask) = self.encode(&encodings)?;
        let token_types = ids.zeros_like()?;

        let states = self.model.forward(&ids, &token_types, Some(&mask))?;
        let rows: Vec<Vec<f32>> = mean_pool(&states, &mask)?.to_vec2()?;

        debug!(count = rows.len(), "Embedded batch");
        Ok(rows.into_iter().map(Embedding::new).collect())
    }
}
