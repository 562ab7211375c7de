//! Event label engine.
//!
//! Two best-effort passes share one embedding of the event text:
//! - category labels: similarity to each category name in the vocabulary
//! - topic-class labels: mean similarity to each taxonomy class's keywords
//!
//! Labels are upserted on `(event_id, kind, label)`, so relabeling an
//! unchanged event rewrites the same rows with the same confidences. Each
//! labeling replaces the event's label set: a stored label that no longer
//! meets its threshold (for example after a merge changed the event text)
//! is deleted.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use news_embeddings::{Embedding, EmbeddingModel};
use news_types::{Event, EventLabel, ItemError, LabelKind, RunSummary};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::LabelingConfig;
use crate::error::EventsError;
use crate::storage::EventStorage;

/// Checkpoint name for the last labeling pass.
pub const LABELING_CHECKPOINT: &str = "event_labeling";

/// Embedded vocabulary, built once per labeler.
struct Vocabulary {
    categories: Vec<(String, Embedding)>,
    classes: Vec<(String, Vec<Embedding>)>,
}

/// Assigns category and topic-class labels to events.
pub struct EventLabeler {
    store: Arc<EventStorage>,
    model: Arc<dyn EmbeddingModel>,
    config: LabelingConfig,
    vocabulary: Mutex<Option<Arc<Vocabulary>>>,
}

impl EventLabeler {
    /// Create a labeler. Fails on invalid configuration or empty vocabulary.
    pub fn new(
        store: Arc<EventStorage>,
        model: Arc<dyn EmbeddingModel>,
        config: LabelingConfig,
    ) -> Result<Self, EventsError> {
        config.validate()?;
        Ok(Self {
            store,
            model,
            config,
            vocabulary: Mutex::new(None),
        })
    }

    fn vocabulary(&self) -> Result<Arc<Vocabulary>, EventsError> {
        let mut guard = self
            .vocabulary
            .lock()
            .map_err(|_| EventsError::Invariant("vocabulary lock poisoned".to_string()))?;
        if let Some(vocabulary) = guard.as_ref() {
            return Ok(vocabulary.clone());
        }

        let names: Vec<String> = self
            .config
            .categories
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        let categories = names
            .iter()
            .cloned()
            .zip(self.model.embed_texts(&names)?)
            .collect();

        let mut classes = Vec::with_capacity(self.config.taxonomy.len());
        for class in &self.config.taxonomy {
            classes.push((class.name.clone(), self.model.embed_texts(&class.keywords)?));
        }

        let vocabulary = Arc::new(Vocabulary {
            categories,
            classes,
        });
        debug!(
            categories = vocabulary.categories.len(),
            classes = vocabulary.classes.len(),
            "Embedded label vocabulary"
        );
        *guard = Some(vocabulary.clone());
        Ok(vocabulary)
    }

    /// Text used to label an event: its own title and description followed
    /// by the titles and descriptions of its linked articles.
    pub fn event_text(&self, event: &Event) -> Result<String, EventsError> {
        let mut parts = vec![event.text()];
        let storage = self.store.storage();
        for link in self.store.links_for_event(&event.event_id)? {
            if let Some(article) = storage.get_article(&link.source_id, &link.article_id)? {
                parts.push(article.embedding_text());
            }
        }
        Ok(parts.join(" "))
    }

    /// Compute labels for an event without storing them.
    pub fn compute_labels(
        &self,
        event: &Event,
        now: DateTime<Utc>,
    ) -> Result<Vec<EventLabel>, EventsError> {
        let vocabulary = self.vocabulary()?;
        let embedding = self.model.embed(&self.event_text(event)?)?;
        let mut labels = Vec::new();

        for (name, category) in &vocabulary.categories {
            let similarity = embedding.cosine_similarity(category);
            if similarity >= self.config.category_threshold {
                labels.push(EventLabel::new(
                    &event.event_id,
                    LabelKind::Category,
                    name,
                    similarity,
                    now,
                ));
            }
        }

        for (name, keywords) in &vocabulary.classes {
            if keywords.is_empty() {
                continue;
            }
            let mean = keywords
                .iter()
                .map(|k| embedding.cosine_similarity(k))
                .sum::<f32>()
                / keywords.len() as f32;
            if mean >= self.config.class_threshold {
                labels.push(EventLabel::new(
                    &event.event_id,
                    LabelKind::TopicClass,
                    name,
                    mean,
                    now,
                ));
            }
        }

        Ok(labels)
    }

    /// Label one event, replacing its previous label set.
    ///
    /// Failures are recorded in the summary; the event itself is never
    /// modified.
    #[instrument(skip(self))]
    pub fn label_event(&self, event_id: &str, now: DateTime<Utc>) -> RunSummary {
        let mut summary = RunSummary::begin("label_event", now);
        self.label_one(event_id, now, &mut summary);
        summary.finish(now)
    }

    fn label_one(&self, event_id: &str, now: DateTime<Utc>, summary: &mut RunSummary) {
        let result = self.store.require_event(event_id).and_then(|event| {
            let labels = self.compute_labels(&event, now)?;
            let removed = self.store.replace_labels(event_id, &labels)?;
            Ok((labels.len(), removed))
        });

        match result {
            Ok((written, removed)) => {
                debug!(event_id, labels = written, removed, "Labeled event");
                summary.events_labeled += 1;
                summary.labels_written += written;
                summary.labels_removed += removed;
            }
            Err(e) => {
                warn!(event_id, error = %e, "Labeling failed");
                summary.record_error(ItemError::new(event_id, e.item_kind(), e.to_string()));
            }
        }
    }

    /// Label every event updated strictly after `since`.
    pub fn label_since(
        &self,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, EventsError> {
        let mut summary = RunSummary::begin("label_since", now);
        for event in self.store.events_updated_since(since)? {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            self.label_one(&event.event_id, now, &mut summary);
        }
        Ok(summary.finish(now))
    }

    /// Label events changed since the last completed pass, then advance the
    /// checkpoint. A cancelled pass leaves the checkpoint unchanged.
    #[instrument(skip(self, cancel))]
    pub fn label_pending(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, EventsError> {
        let since = self
            .store
            .get_time_checkpoint(LABELING_CHECKPOINT)?
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut summary = self.label_since(since, now, cancel)?;
        summary.operation = "label_pending".to_string();

        if !summary.cancelled {
            self.store.put_time_checkpoint(LABELING_CHECKPOINT, now)?;
        }

        info!(
            labeled = summary.events_labeled,
            labels = summary.labels_written,
            errors = summary.errors.len(),
            "Labeling pass complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::TopicClass;
    use chrono::{Duration, TimeZone};
    use news_embeddings::TableEmbedder;
    use news_storage::Storage;
    use news_types::{Article, EventArticleLink, ItemErrorKind};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use ulid::Ulid;

    const DIM: usize = 8;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    /// Event text is steered onto axis 4 by "Cup", otherwise onto axis 0 by
    /// "Bank".
    fn model() -> Arc<dyn EmbeddingModel> {
        Arc::new(
            TableEmbedder::new(DIM)
                .with_text("business", TableEmbedder::blend(DIM, 0, 1, 0.9))
                .with_text("sport", TableEmbedder::axis(DIM, 4))
                .with_text("economy", TableEmbedder::blend(DIM, 0, 2, 0.8))
                .with_text("market", TableEmbedder::blend(DIM, 0, 3, 0.8))
                .with_text("match", TableEmbedder::axis(DIM, 4))
                .with_text("game", TableEmbedder::axis(DIM, 5))
                .with_rule("Cup", TableEmbedder::axis(DIM, 4))
                .with_rule("Bank", TableEmbedder::axis(DIM, 0)),
        )
    }

    fn config() -> LabelingConfig {
        LabelingConfig {
            categories: vec!["business".to_string(), "sport".to_string()],
            taxonomy: vec![
                TopicClass::new("business", &["economy", "market"]),
                TopicClass::new("sports", &["match", "game"]),
            ],
            ..Default::default()
        }
    }

    fn setup() -> (EventLabeler, Arc<EventStorage>, TempDir) {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());
        let store = Arc::new(EventStorage::new(storage));
        let labeler = EventLabeler::new(store.clone(), model(), config()).unwrap();
        (labeler, store, temp)
    }

    fn seed_event(store: &EventStorage, title: &str) -> Event {
        let start = now() - Duration::hours(1);
        let id = Ulid::from_parts(start.timestamp_millis() as u64, 1).to_string();
        let event = Event::new(id, title, None, start, 0.9, now());
        let article = Article::new("1", "bbc", "Central Bank Raises Rates", start);
        store.storage().put_article(&article).unwrap();
        store
            .create_event(
                &event,
                &[EventArticleLink::new(&event.event_id, "bbc", "1", 1.0, now())],
            )
            .unwrap();
        event
    }

    #[test]
    fn test_label_event_writes_category_and_class() {
        let (labeler, store, _temp) = setup();
        let event = seed_event(&store, "Central Bank Raises Rates");

        let summary = labeler.label_event(&event.event_id, now());
        assert_eq!(summary.events_labeled, 1);
        assert_eq!(summary.labels_written, 2);

        let labels = store.labels_for_event(&event.event_id).unwrap();
        let names: Vec<(LabelKind, &str)> =
            labels.iter().map(|l| (l.kind, l.label.as_str())).collect();
        assert_eq!(
            names,
            vec![
                (LabelKind::Category, "business"),
                (LabelKind::TopicClass, "business")
            ]
        );
        assert!((labels[0].confidence_score - 0.9).abs() < 1e-5);
        assert!((labels[1].confidence_score - 0.8).abs() < 1e-5);
    }

    #[test]
    fn test_labeling_is_idempotent() {
        let (labeler, store, _temp) = setup();
        let event = seed_event(&store, "Central Bank Raises Rates");

        labeler.label_event(&event.event_id, now());
        let first = store.labels_for_event(&event.event_id).unwrap();
        labeler.label_event(&event.event_id, now());
        let second = store.labels_for_event(&event.event_id).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_relabeling_removes_labels_that_no_longer_qualify() {
        let (labeler, store, _temp) = setup();
        let mut event = seed_event(&store, "Central Bank Raises Rates");
        labeler.label_event(&event.event_id, now());
        assert_eq!(store.labels_for_event(&event.event_id).unwrap().len(), 2);

        event.title = "Cup final tonight".to_string();
        event.updated_at = now() + Duration::minutes(5);
        store.update_event(&event, &[]).unwrap();

        let summary = labeler.label_event(&event.event_id, now() + Duration::minutes(5));
        assert_eq!(summary.labels_written, 1);
        assert_eq!(summary.labels_removed, 2);

        let labels = store.labels_for_event(&event.event_id).unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].kind, LabelKind::Category);
        assert_eq!(labels[0].label, "sport");
    }

    #[test]
    fn test_missing_event_is_recorded_not_thrown() {
        let (labeler, _store, _temp) = setup();
        let summary = labeler.label_event("01HQ0000000000000000000000", now());
        assert_eq!(summary.events_labeled, 0);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].kind, ItemErrorKind::Invariant);
    }

    #[test]
    fn test_label_pending_uses_checkpoint() {
        let (labeler, store, _temp) = setup();
        seed_event(&store, "Central Bank Raises Rates");
        let cancel = CancellationToken::new();

        let first = labeler.label_pending(now(), &cancel).unwrap();
        assert_eq!(first.events_labeled, 1);

        let second = labeler
            .label_pending(now() + Duration::minutes(10), &cancel)
            .unwrap();
        assert_eq!(second.events_labeled, 0);
    }

    #[test]
    fn test_empty_taxonomy_is_fatal() {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());
        let store = Arc::new(EventStorage::new(storage));
        let config = LabelingConfig {
            taxonomy: vec![],
            ..config()
        };
        assert!(EventLabeler::new(store, model(), config).is_err());
    }
}
