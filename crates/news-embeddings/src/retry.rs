//! Retry wrapper for embedding providers.
//!
//! Transient failures are retried with exponential backoff. Permanent
//! failures and exhausted budgets are returned to the caller, which skips
//! the affected item.

use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff};
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;
use crate::model::{Embedding, EmbeddingModel, ModelInfo};

/// Wraps any [`EmbeddingModel`] with a bounded retry policy.
pub struct RetryingEmbedder<M> {
    inner: M,
    max_retries: u32,
    initial_interval: Duration,
    max_elapsed: Duration,
}

impl<M: EmbeddingModel> RetryingEmbedder<M> {
    pub fn new(inner: M, config: &EmbeddingConfig) -> Self {
        Self {
            inner,
            max_retries: config.max_retries.max(1),
            initial_interval: config.initial_interval(),
            max_elapsed: config.max_elapsed(),
        }
    }

    /// Get the wrapped model.
    pub fn inner(&self) -> &M {
        &self.inner
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        }
    }

    fn with_retry<T>(
        &self,
        what: &str,
        mut call: impl FnMut() -> Result<T, EmbeddingError>,
    ) -> Result<T, EmbeddingError> {
        let mut backoff = self.backoff();
        let mut attempts = 0;

        loop {
            attempts += 1;
            match call() {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    if attempts >= self.max_retries {
                        warn!(error = %e, attempts, what, "Embedding retries exhausted");
                        return Err(e);
                    }
                    match backoff.next_backoff() {
                        Some(duration) => {
                            debug!(
                                error = %e,
                                retry_in_ms = duration.as_millis() as u64,
                                what,
                                "Embedding failed, retrying"
                            );
                            std::thread::sleep(duration);
                        }
                        None => {
                            warn!(error = %e, what, "Embedding backoff exhausted");
                            return Err(e);
                        }
                    }
                }
            }
        }
    }
}

impl<M: EmbeddingModel> EmbeddingModel for RetryingEmbedder<M> {
    fn info(&self) -> &ModelInfo {
        self.inner.info()
    }

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.with_retry("embed", || self.inner.embed(text))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        self.with_retry("embed_batch", || self.inner.embed_batch(texts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        info: ModelInfo,
        failures_left: AtomicU32,
        permanent: bool,
    }

    impl Flaky {
        fn new(failures: u32, permanent: bool) -> Self {
            Self {
                info: ModelInfo {
                    name: "flaky".into(),
                    dimension: 2,
                    max_sequence_length: 8,
                },
                failures_left: AtomicU32::new(failures),
                permanent,
            }
        }
    }

    impl EmbeddingModel for Flaky {
        fn info(&self) -> &ModelInfo {
            &self.info
        }

        fn embed(&self, _text: &str) -> Result<Embedding, EmbeddingError> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                if self.permanent {
                    return Err(EmbeddingError::InvalidInput("bad".into()));
                }
                return Err(EmbeddingError::Transient("busy".into()));
            }
            Ok(Embedding::new(vec![1.0, 0.0]))
        }
    }

    fn fast_config(max_retries: u32) -> EmbeddingConfig {
        EmbeddingConfig {
            max_retries,
            initial_interval_ms: 1,
            max_elapsed_secs: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_recovers_from_transient_failures() {
        let embedder = RetryingEmbedder::new(Flaky::new(2, false), &fast_config(3));
        assert!(embedder.embed("headline").is_ok());
    }

    #[test]
    fn test_gives_up_after_max_retries() {
        let embedder = RetryingEmbedder::new(Flaky::new(5, false), &fast_config(2));
        assert!(matches!(
            embedder.embed("headline"),
            Err(EmbeddingError::Transient(_))
        ));
        // Two attempts consumed two failures
        assert_eq!(embedder.inner().failures_left.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_permanent_failure_not_retried() {
        let embedder = RetryingEmbedder::new(Flaky::new(1, true), &fast_config(3));
        assert!(embedder.embed("headline").is_err());
        assert_eq!(embedder.inner().failures_left.load(Ordering::SeqCst), 0);
    }
}
