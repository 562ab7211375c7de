//! Event lifecycle manager.
//!
//! Turns candidate groups into events: each group either merges into a
//! recent active event with a similar title or becomes a new event. A
//! separate sweep closes events that have gone stale.
//!
//! ## State machine
//! `active -> active` on merge, `active -> inactive` on sweep. Nothing leaves
//! `inactive`.
//!
//! Every group is one unit of work committed in a single batch. A failed
//! unit is recorded in the run summary and the run moves on.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use news_embeddings::{Embedding, EmbeddingModel};
use news_types::{
    Article, Event, EventArticleLink, EventId, ItemError, ItemErrorKind, RunSummary,
};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use ulid::Ulid;

use crate::config::{EventsConfig, LifecycleConfig};
use crate::error::EventsError;
use crate::grouper::{CandidateGroup, SimilarityGrouper};
use crate::source::ArticleSource;
use crate::storage::{EventStorage, Watermark};

/// Checkpoint name for the detection watermark.
pub const DETECTION_WATERMARK: &str = "event_detection";

/// How a candidate group was resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeDecision {
    /// A new active event was inserted
    Created { event_id: EventId },
    /// The group was folded into an existing active event
    Merged {
        event_id: EventId,
        similarity: f32,
        links_added: usize,
    },
}

impl MergeDecision {
    pub fn event_id(&self) -> &str {
        match self {
            MergeDecision::Created { event_id } | MergeDecision::Merged { event_id, .. } => event_id,
        }
    }
}

/// Title embeddings of events, cached for the length of one run.
#[derive(Default)]
struct TitleCache {
    embeddings: HashMap<EventId, Embedding>,
}

impl TitleCache {
    fn get_or_embed(
        &mut self,
        model: &dyn EmbeddingModel,
        event: &Event,
    ) -> Result<&Embedding, EventsError> {
        if !self.embeddings.contains_key(&event.event_id) {
            let embedding = model.embed(&event.title)?;
            self.embeddings.insert(event.event_id.clone(), embedding);
        }
        self.embeddings
            .get(&event.event_id)
            .ok_or_else(|| EventsError::Invariant(format!("title cache miss for {}", event.event_id)))
    }
}

/// Creates, merges and retires events.
pub struct EventLifecycle {
    store: Arc<EventStorage>,
    model: Arc<dyn EmbeddingModel>,
    grouper: SimilarityGrouper,
    config: LifecycleConfig,
}

impl EventLifecycle {
    /// Create a lifecycle manager. Fails on invalid configuration.
    pub fn new(
        store: Arc<EventStorage>,
        model: Arc<dyn EmbeddingModel>,
        config: &EventsConfig,
    ) -> Result<Self, EventsError> {
        config.lifecycle.validate()?;
        let grouper = SimilarityGrouper::new(model.clone(), config.grouping.clone())?;
        Ok(Self {
            store,
            model,
            grouper,
            config: config.lifecycle.clone(),
        })
    }

    pub fn store(&self) -> &Arc<EventStorage> {
        &self.store
    }

    pub fn grouper(&self) -> &SimilarityGrouper {
        &self.grouper
    }

    /// Read recent articles past the watermark, group them and resolve
    /// every group into an event.
    ///
    /// Valid articles behind the watermark that are still inside the
    /// lookback and not linked to any event are read again, so a story
    /// whose first article arrived alone is grouped once corroboration
    /// shows up in a later run.
    ///
    /// Returns `Err` only if the article source, the watermark or the link
    /// index cannot be read; per-group failures land in the summary. A
    /// cancelled run leaves the watermark where it was, so the next run
    /// re-reads the same articles and merges them into the events already
    /// committed.
    #[instrument(skip(self, source, cancel), fields(source = source.name()))]
    pub fn detect_and_merge_events(
        &self,
        source: &dyn ArticleSource,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, EventsError> {
        let mut summary = RunSummary::begin("detect_and_merge_events", now);

        let watermark = self.store.get_watermark(DETECTION_WATERMARK)?;
        let start = now - self.grouper.config().lookback();
        let mut articles = source.articles_between(start, now + Duration::milliseconds(1))?;
        let mut retried = 0usize;
        if let Some(watermark) = &watermark {
            let mut pending = Vec::with_capacity(articles.len());
            for article in articles {
                if watermark.is_before(&article) {
                    pending.push(article);
                } else if self.is_unlinked(&article)? {
                    retried += 1;
                    pending.push(article);
                }
            }
            articles = pending;
        }
        debug!(articles = articles.len(), retried, ?watermark, "Loaded articles");

        let mut cache = TitleCache::default();
        let mut groups = self.grouper.group(articles);

        while let Some(group) = groups.next() {
            if cancel.is_cancelled() {
                info!("Detection cancelled between groups");
                summary.cancelled = true;
                break;
            }

            summary.candidate_groups += 1;
            match self.resolve_group(&group, now, &mut cache) {
                Ok(MergeDecision::Created { event_id }) => {
                    debug!(event_id = %event_id, size = group.len(), "Created event");
                    summary.events_created += 1;
                }
                Ok(MergeDecision::Merged {
                    event_id,
                    similarity,
                    links_added,
                }) => {
                    debug!(event_id = %event_id, similarity, links_added, "Merged into event");
                    summary.events_merged += 1;
                }
                Err(e) => {
                    warn!(seed = %group.seed.reference(), error = %e, "Candidate group failed");
                    summary.record_error(ItemError::new(
                        group.seed.reference().to_string(),
                        e.item_kind(),
                        e.to_string(),
                    ));
                }
            }
        }

        let report = groups.into_report();
        summary.articles_seen = report.articles_seen;
        summary.errors.extend(report.errors);
        summary.ungrouped = report.ungrouped;

        if !summary.cancelled {
            // Re-read articles sit behind the stored mark; never move it back
            let advanced = report
                .last_processed
                .as_ref()
                .filter(|last| watermark.as_ref().map_or(true, |w| w.is_before(last)));
            if let Some(last) = advanced {
                if let Err(e) = self
                    .store
                    .put_watermark(DETECTION_WATERMARK, &Watermark::from_article(last))
                {
                    warn!(error = %e, "Failed to advance watermark");
                    summary.record_error(ItemError::new(
                        DETECTION_WATERMARK,
                        ItemErrorKind::Storage,
                        e.to_string(),
                    ));
                }
            }
        }

        info!(
            articles = summary.articles_seen,
            groups = summary.candidate_groups,
            created = summary.events_created,
            merged = summary.events_merged,
            ungrouped = summary.ungrouped.len(),
            errors = summary.errors.len(),
            "Event detection complete"
        );
        Ok(summary.finish(now))
    }

    /// Resolve one candidate group into a new or existing event.
    pub fn create_or_merge(
        &self,
        group: &CandidateGroup,
        now: DateTime<Utc>,
    ) -> Result<MergeDecision, EventsError> {
        self.resolve_group(group, now, &mut TitleCache::default())
    }

    /// A valid article that no event links to yet.
    fn is_unlinked(&self, article: &Article) -> Result<bool, EventsError> {
        if article.validate().is_err() {
            return Ok(false);
        }
        Ok(self.store.events_for_article(&article.reference())?.is_empty())
    }

    fn resolve_group(
        &self,
        group: &CandidateGroup,
        now: DateTime<Utc>,
        cache: &mut TitleCache,
    ) -> Result<MergeDecision, EventsError> {
        let representative = &group.seed;
        let candidate_embedding = self.model.embed(&representative.title)?;

        let since = now - self.config.merge_lookback();
        let mut best: Option<(Event, f32)> = None;
        for event in self.store.active_events_since(since)? {
            let embedding = match cache.get_or_embed(self.model.as_ref(), &event) {
                Ok(embedding) => embedding,
                Err(e) => {
                    warn!(event_id = %event.event_id, error = %e, "Cannot embed event title, not a merge target");
                    continue;
                }
            };
            let similarity = candidate_embedding.cosine_similarity(embedding);
            if best.as_ref().map_or(true, |(_, s)| similarity > *s) {
                best = Some((event, similarity));
            }
        }

        match best {
            Some((event, similarity)) if similarity >= self.config.merge_threshold => {
                self.merge(&event.event_id, group, similarity, now)
            }
            _ => {
                let event_id = self.create(group, now)?;
                cache.embeddings.insert(event_id.clone(), candidate_embedding);
                Ok(MergeDecision::Created { event_id })
            }
        }
    }

    fn merge(
        &self,
        event_id: &str,
        group: &CandidateGroup,
        similarity: f32,
        now: DateTime<Utc>,
    ) -> Result<MergeDecision, EventsError> {
        // Re-read so the write is based on committed state
        let mut event = self.store.get_event(event_id)?.ok_or_else(|| {
            EventsError::Invariant(format!("merge target {} not found", event_id))
        })?;
        if !event.is_active() {
            return Err(EventsError::Invariant(format!(
                "merge target {} is no longer active",
                event_id
            )));
        }

        let mut new_links = Vec::new();
        for (article, score) in group.scored_articles() {
            if !self.store.has_link(event_id, &article.reference())? {
                new_links.push(EventArticleLink::new(
                    event_id,
                    &article.source_id,
                    &article.article_id,
                    score,
                    now,
                ));
            }
        }

        event.absorb_confidence(group.confidence(), now);
        self.store.update_event(&event, &new_links)?;

        Ok(MergeDecision::Merged {
            event_id: event_id.to_string(),
            similarity,
            links_added: new_links.len(),
        })
    }

    fn create(&self, group: &CandidateGroup, now: DateTime<Utc>) -> Result<EventId, EventsError> {
        let start_time = group.start_time();
        let event_id = self.derive_event_id(group, start_time)?;

        let event = Event::new(
            &event_id,
            &group.seed.title,
            group.seed.description.clone(),
            start_time,
            group.confidence(),
            now,
        );
        let links: Vec<EventArticleLink> = group
            .scored_articles()
            .map(|(article, score)| {
                EventArticleLink::new(&event_id, &article.source_id, &article.article_id, score, now)
            })
            .collect();

        self.store.create_event(&event, &links)?;
        Ok(event_id)
    }

    /// ULID with the start time as its time part and a random part hashed
    /// from the seed article, so identical input yields identical ids.
    fn derive_event_id(
        &self,
        group: &CandidateGroup,
        start_time: DateTime<Utc>,
    ) -> Result<EventId, EventsError> {
        let timestamp_ms = start_time.timestamp_millis().max(0) as u64;
        let seed = group.seed.reference().to_string();

        for attempt in 0u32..16 {
            let mut hasher = Sha256::new();
            hasher.update(seed.as_bytes());
            hasher.update(attempt.to_be_bytes());
            let digest = hasher.finalize();

            let mut random = [0u8; 16];
            random[6..].copy_from_slice(&digest[..10]);
            let id = Ulid::from_parts(timestamp_ms, u128::from_be_bytes(random)).to_string();

            if !self.store.event_exists(&id)? {
                return Ok(id);
            }
            debug!(event_id = %id, attempt, "Derived event id taken");
        }

        Err(EventsError::Invariant(format!(
            "no free event id for seed {}",
            seed
        )))
    }

    /// Close every active event whose start time is older than the
    /// staleness horizon.
    #[instrument(skip(self, cancel))]
    pub fn sweep_stale_events(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, EventsError> {
        let mut summary = RunSummary::begin("sweep_stale_events", now);
        let cutoff = now - self.config.staleness();

        let stale: Vec<Event> = self
            .store
            .list_events(Some(news_types::EventStatus::Active))?
            .into_iter()
            .filter(|e| e.start_time < cutoff)
            .collect();

        for candidate in stale {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            match self.deactivate(&candidate.event_id, cutoff, now) {
                Ok(true) => summary.events_deactivated += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(event_id = %candidate.event_id, error = %e, "Failed to deactivate event");
                    summary.record_error(ItemError::new(
                        &candidate.event_id,
                        e.item_kind(),
                        e.to_string(),
                    ));
                }
            }
        }

        info!(
            deactivated = summary.events_deactivated,
            errors = summary.errors.len(),
            "Staleness sweep complete"
        );
        Ok(summary.finish(now))
    }

    fn deactivate(
        &self,
        event_id: &str,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, EventsError> {
        let mut event = self.store.require_event(event_id)?;
        if event.start_time >= cutoff || !event.deactivate(now) {
            return Ok(false);
        }
        self.store.update_event(&event, &[])?;
        debug!(event_id = %event_id, "Event deactivated");
        Ok(true)
    }
}
