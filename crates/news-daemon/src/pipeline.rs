//! Component wiring.
//!
//! One embedding model instance is shared by every engine; the pipeline
//! owns it for the lifetime of the process.

use std::sync::Arc;

use anyhow::{Context, Result};
use news_embeddings::{CandleEmbedder, EmbeddingModel, RetryingEmbedder};
use news_events::{
    ArticleSource, EventAnalyzer, EventLabeler, EventLifecycle, EventStorage, StoredArticles,
};
use news_storage::Storage;
use news_topics::{TopicAggregator, TopicHierarchy, TopicStorage};
use tracing::info;

use crate::settings::Settings;

/// Every engine of the pipeline, built over one storage handle and one
/// embedding model.
pub struct Pipeline {
    pub storage: Arc<Storage>,
    pub events: Arc<EventStorage>,
    pub topics: Arc<TopicStorage>,
    pub source: Arc<dyn ArticleSource>,
    pub lifecycle: Arc<EventLifecycle>,
    pub labeler: Arc<EventLabeler>,
    pub analyzer: Arc<EventAnalyzer>,
    pub aggregator: Arc<TopicAggregator>,
    pub hierarchy: Arc<TopicHierarchy>,
}

impl Pipeline {
    /// Build every engine. Configuration errors surface here, before any
    /// processing begins.
    pub fn new(
        settings: &Settings,
        storage: Arc<Storage>,
        model: Arc<dyn EmbeddingModel>,
    ) -> Result<Self> {
        let events = Arc::new(EventStorage::new(storage.clone()));
        let topics = Arc::new(TopicStorage::new(storage.clone()));
        let source: Arc<dyn ArticleSource> = Arc::new(StoredArticles::new(storage.clone()));

        let lifecycle = EventLifecycle::new(events.clone(), model.clone(), &settings.events)
            .context("Invalid event configuration")?;
        let labeler = EventLabeler::new(
            events.clone(),
            model.clone(),
            settings.events.labeling.clone(),
        )
        .context("Invalid labeling configuration")?;
        let aggregator = TopicAggregator::new(
            events.clone(),
            topics.clone(),
            model.clone(),
            settings.topics.detection.clone(),
        )
        .context("Invalid topic detection configuration")?;
        let hierarchy = TopicHierarchy::new(
            events.clone(),
            topics.clone(),
            model,
            settings.topics.hierarchy.clone(),
        )
        .context("Invalid topic hierarchy configuration")?;

        Ok(Self {
            storage,
            events,
            topics,
            source,
            lifecycle: Arc::new(lifecycle),
            labeler: Arc::new(labeler),
            analyzer: Arc::new(EventAnalyzer::new(events.clone())),
            aggregator: Arc::new(aggregator),
            hierarchy: Arc::new(hierarchy),
        })
    }
}

/// Load the configured sentence model, wrapped in the retry policy.
pub fn load_model(settings: &Settings) -> Result<Arc<dyn EmbeddingModel>> {
    info!(repo = %settings.embedding.model_repo, "Loading embedding model");
    let embedder =
        CandleEmbedder::from_config(&settings.embedding).context("Failed to load embedding model")?;
    Ok(Arc::new(RetryingEmbedder::new(embedder, &settings.embedding)))
}
