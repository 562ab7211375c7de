//! Topic aggregator.
//!
//! Clusters well-corroborated recent events by embedding distance and turns
//! each cluster into a topic. Noise events produce nothing.
//!
//! Re-running over an unchanged event set is a no-op: a cluster whose exact
//! member set already backs a topic is counted as existing, not recreated.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use news_embeddings::EmbeddingModel;
use news_events::EventStorage;
use news_types::{
    Event, EventId, EventLabel, ItemError, ItemErrorKind, LabelKind, RunSummary, Topic, TopicId,
};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use ulid::Ulid;

use crate::clustering::{dbscan, pairwise_distances};
use crate::config::DetectionConfig;
use crate::error::TopicsError;
use crate::profile::event_profile;
use crate::storage::{member_fingerprint, TopicStorage};

/// Outcome of a detection run.
#[derive(Debug, Clone)]
pub struct TopicDetection {
    pub summary: RunSummary,
    /// Topics created by this run, in creation order
    pub created: Vec<TopicId>,
}

/// Detects topics from clusters of events.
pub struct TopicAggregator {
    events: Arc<EventStorage>,
    store: Arc<TopicStorage>,
    model: Arc<dyn EmbeddingModel>,
    config: DetectionConfig,
}

impl TopicAggregator {
    /// Create an aggregator. Fails on invalid configuration.
    pub fn new(
        events: Arc<EventStorage>,
        store: Arc<TopicStorage>,
        model: Arc<dyn EmbeddingModel>,
        config: DetectionConfig,
    ) -> Result<Self, TopicsError> {
        config.validate()?;
        Ok(Self {
            events,
            store,
            model,
            config,
        })
    }

    /// Events started within the lookback horizon with enough linked
    /// articles, ordered by start time.
    pub fn candidate_events(&self, now: DateTime<Utc>) -> Result<Vec<Event>, TopicsError> {
        let since = now - self.config.lookback();
        let mut candidates = Vec::new();
        for event in self.events.events_started_since(since)? {
            if self.events.article_count(&event.event_id)? >= self.config.min_articles {
                candidates.push(event);
            }
        }
        Ok(candidates)
    }

    /// Cluster candidate events and create one topic per new cluster.
    #[instrument(skip(self, cancel))]
    pub fn detect_topics(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<TopicDetection, TopicsError> {
        let mut summary = RunSummary::begin("detect_topics", now);
        let mut created = Vec::new();

        let candidates = self.candidate_events(now)?;
        let mut texts = Vec::with_capacity(candidates.len());
        let mut profiled = Vec::with_capacity(candidates.len());
        for event in candidates {
            match event_profile(&self.events, &event) {
                Ok(text) => {
                    texts.push(text);
                    profiled.push(event);
                }
                Err(e) => {
                    warn!(event_id = %event.event_id, error = %e, "Event profile failed");
                    summary.record_error(ItemError::new(&event.event_id, e.item_kind(), e.to_string()));
                }
            }
        }

        let mut embedded = Vec::with_capacity(profiled.len());
        let mut vectors = Vec::with_capacity(profiled.len());
        for (event, result) in profiled.into_iter().zip(self.model.embed_each(&texts)) {
            match result {
                Ok(vector) => {
                    vectors.push(vector);
                    embedded.push(event);
                }
                Err(e) => {
                    warn!(event_id = %event.event_id, error = %e, "Skipping event, embedding failed");
                    summary.record_error(ItemError::new(
                        &event.event_id,
                        ItemErrorKind::Embedding,
                        e.to_string(),
                    ));
                }
            }
        }

        let clustering = dbscan(
            &pairwise_distances(&vectors),
            self.config.eps,
            self.config.min_samples,
        )?;
        summary.candidate_groups = clustering.clusters.len();
        debug!(
            events = embedded.len(),
            clusters = clustering.clusters.len(),
            noise = clustering.noise.len(),
            "Clustered events"
        );

        for cluster in &clustering.clusters {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let members: Vec<&Event> = cluster.iter().map(|&i| &embedded[i]).collect();
            match self.create_topic(&members, now) {
                Ok(Some(topic_id)) => {
                    summary.topics_created += 1;
                    created.push(topic_id);
                }
                Ok(None) => summary.topics_existing += 1,
                Err(e) => {
                    let item = members
                        .first()
                        .map(|m| m.event_id.clone())
                        .unwrap_or_default();
                    warn!(item = %item, error = %e, "Topic creation failed");
                    summary.record_error(ItemError::new(item, e.item_kind(), e.to_string()));
                }
            }
        }

        info!(
            created = summary.topics_created,
            existing = summary.topics_existing,
            errors = summary.errors.len(),
            cancelled = summary.cancelled,
            "Topic detection complete"
        );
        Ok(TopicDetection {
            summary: summary.finish(now),
            created,
        })
    }

    /// Persist a topic for one cluster. Returns `None` if the member set
    /// already has a topic.
    fn create_topic(
        &self,
        members: &[&Event],
        now: DateTime<Utc>,
    ) -> Result<Option<TopicId>, TopicsError> {
        let member_ids: Vec<EventId> = members.iter().map(|e| e.event_id.clone()).collect();
        if let Some(existing) = self.store.topic_for_members(&member_ids)? {
            debug!(topic_id = %existing, "Cluster already has a topic");
            return Ok(None);
        }

        let mut labels = Vec::new();
        for event in members {
            labels.extend(self.events.labels_for_event(&event.event_id)?);
        }
        let (categories, classes) = common_labels(&labels);

        let topic = synthesize_topic(members, now)
            .ok_or_else(|| {
                TopicsError::Clustering("cannot build a topic from an empty cluster".to_string())
            })?
            .with_top_labels(categories, classes);
        self.store.create_topic(&topic, &member_ids)?;
        info!(
            topic_id = %topic.topic_id,
            name = %topic.name,
            members = member_ids.len(),
            "Created topic"
        );
        Ok(Some(topic.topic_id))
    }
}

/// Build the topic record for a cluster.
///
/// The name is the title of the highest-confidence member (earliest wins a
/// tie); confidence is the mean member confidence. The id embeds `now` and a
/// hash of the member set.
pub fn synthesize_topic(members: &[&Event], now: DateTime<Utc>) -> Option<Topic> {
    let mut lead = *members.first()?;
    for &event in &members[1..] {
        if event.confidence_score > lead.confidence_score {
            lead = event;
        }
    }

    let start = members.iter().map(|e| e.start_time).min()?;
    let end = members.iter().map(|e| e.start_time).max()?;
    let confidence =
        members.iter().map(|e| e.confidence_score).sum::<f32>() / members.len() as f32;
    let description = format!(
        "Topic covering {} related events from {} to {}",
        members.len(),
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d")
    );

    let member_ids: Vec<EventId> = members.iter().map(|e| e.event_id.clone()).collect();
    let digest = Sha256::digest(member_fingerprint(&member_ids).as_bytes());
    let mut random = [0u8; 16];
    random[6..].copy_from_slice(&digest[..10]);
    let timestamp_ms = now.timestamp_millis().max(0) as u64;
    let topic_id = Ulid::from_parts(timestamp_ms, u128::from_be_bytes(random)).to_string();

    Some(Topic::new(
        topic_id,
        lead.title.clone(),
        description,
        confidence,
        now,
    ))
}

/// Number of categories and topic classes kept on a topic.
pub const TOP_LABELS: usize = 3;

/// The most frequent categories and topic classes among member labels.
///
/// Each label counts once per event carrying it. Ties go to the
/// alphabetically first label.
pub fn common_labels(labels: &[EventLabel]) -> (Vec<String>, Vec<String>) {
    let top = |kind: LabelKind| {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for label in labels.iter().filter(|l| l.kind == kind) {
            *counts.entry(label.label.as_str()).or_default() += 1;
        }
        let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
            .into_iter()
            .take(TOP_LABELS)
            .map(|(label, _)| label.to_string())
            .collect::<Vec<_>>()
    };
    (top(LabelKind::Category), top(LabelKind::TopicClass))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use news_embeddings::TableEmbedder;
    use news_storage::Storage;
    use news_types::EventArticleLink;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const DIM: usize = 8;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 8, 12, 0, 0).unwrap()
    }

    fn model() -> Arc<dyn EmbeddingModel> {
        Arc::new(
            TableEmbedder::new(DIM)
                .with_rule("Rates", TableEmbedder::blend(DIM, 0, 5, 0.98))
                .with_rule("Quake", TableEmbedder::axis(DIM, 1))
                .with_rule("Election", TableEmbedder::axis(DIM, 2))
                .with_rule("Festival", TableEmbedder::axis(DIM, 3))
                .with_rule("Transfer", TableEmbedder::axis(DIM, 4)),
        )
    }

    struct Fixture {
        aggregator: TopicAggregator,
        events: Arc<EventStorage>,
        topics: Arc<TopicStorage>,
        _temp: TempDir,
    }

    fn setup() -> Fixture {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());
        let events = Arc::new(EventStorage::new(storage.clone()));
        let topics = Arc::new(TopicStorage::new(storage));
        let aggregator = TopicAggregator::new(
            events.clone(),
            topics.clone(),
            model(),
            DetectionConfig::default(),
        )
        .unwrap();
        Fixture {
            aggregator,
            events,
            topics,
            _temp: temp,
        }
    }

    fn seed(
        events: &EventStorage,
        n: u64,
        title: &str,
        hours_ago: i64,
        confidence: f32,
        links: usize,
    ) -> Event {
        let start = now() - Duration::hours(hours_ago);
        let id = Ulid::from_parts(start.timestamp_millis() as u64, u128::from(n)).to_string();
        let event = Event::new(id, title, None, start, confidence, start);
        let links: Vec<EventArticleLink> = (0..links)
            .map(|i| {
                EventArticleLink::new(&event.event_id, "bbc", format!("{}-{}", n, i), 0.9, start)
            })
            .collect();
        events.create_event(&event, &links).unwrap();
        event
    }

    /// Six related and four unrelated events over the past week.
    fn seed_week(events: &EventStorage) -> Vec<Event> {
        let titles = [
            ("Rates rise in March", 0.80),
            ("Quake hits coast", 0.90),
            ("Rates held by ECB", 0.85),
            ("Election called", 0.70),
            ("Rates outlook dims", 0.95),
            ("Festival opens", 0.60),
            ("Rates cut in Japan", 0.75),
            ("Transfer record broken", 0.65),
            ("Rates surprise markets", 0.70),
            ("Rates debate continues", 0.90),
        ];
        titles
            .iter()
            .enumerate()
            .map(|(i, (title, conf))| seed(events, i as u64 + 1, title, 10 + 15 * i as i64, *conf, 3))
            .collect()
    }

    #[test]
    fn test_six_related_events_form_one_topic() {
        let fx = setup();
        let seeded = seed_week(&fx.events);
        let cancel = CancellationToken::new();

        let run = fx.aggregator.detect_topics(now(), &cancel).unwrap();
        assert_eq!(run.summary.topics_created, 1);
        assert_eq!(run.created.len(), 1);
        assert!(run.summary.errors.is_empty());

        let topic = fx.topics.require_topic(&run.created[0]).unwrap();
        // Highest confidence related event is "Rates outlook dims" (0.95)
        assert_eq!(topic.name, "Rates outlook dims");
        assert!((topic.confidence_score - (0.80 + 0.85 + 0.95 + 0.75 + 0.70 + 0.90) / 6.0).abs() < 1e-5);
        assert!(topic.description.starts_with("Topic covering 6 related events from "));

        let mut members = fx.topics.events_for_topic(&topic.topic_id).unwrap();
        members.sort();
        let mut expected: Vec<String> = seeded
            .iter()
            .filter(|e| e.title.contains("Rates"))
            .map(|e| e.event_id.clone())
            .collect();
        expected.sort();
        assert_eq!(members, expected);
    }

    #[test]
    fn test_topic_keeps_most_common_member_labels() {
        let fx = setup();
        let seeded = seed_week(&fx.events);
        let related: Vec<&Event> = seeded.iter().filter(|e| e.title.contains("Rates")).collect();

        let mut labels = Vec::new();
        for (i, event) in related.iter().enumerate() {
            let id = &event.event_id;
            labels.push(EventLabel::new(id, LabelKind::Category, "business", 0.9, now()));
            labels.push(EventLabel::new(id, LabelKind::TopicClass, "economy", 0.8, now()));
            if i < 3 {
                labels.push(EventLabel::new(id, LabelKind::Category, "politics", 0.8, now()));
            }
            if i < 2 {
                labels.push(EventLabel::new(id, LabelKind::Category, "world", 0.8, now()));
                labels.push(EventLabel::new(id, LabelKind::Category, "asia", 0.8, now()));
            }
        }
        fx.events.upsert_labels(&labels).unwrap();

        let run = fx
            .aggregator
            .detect_topics(now(), &CancellationToken::new())
            .unwrap();
        let topic = fx.topics.require_topic(&run.created[0]).unwrap();

        // "asia" and "world" tie on two events; the alphabetically first wins
        assert_eq!(topic.top_categories, vec!["business", "politics", "asia"]);
        assert_eq!(topic.top_classes, vec!["economy"]);
    }

    #[test]
    fn test_common_labels_without_labels_is_empty() {
        let (categories, classes) = common_labels(&[]);
        assert!(categories.is_empty());
        assert!(classes.is_empty());
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let fx = setup();
        seed_week(&fx.events);
        let cancel = CancellationToken::new();

        fx.aggregator.detect_topics(now(), &cancel).unwrap();
        let second = fx
            .aggregator
            .detect_topics(now() + Duration::minutes(30), &cancel)
            .unwrap();

        assert_eq!(second.summary.topics_created, 0);
        assert_eq!(second.summary.topics_existing, 1);
        assert_eq!(fx.topics.list_topics().unwrap().len(), 1);
    }

    #[test]
    fn test_thin_and_old_events_are_not_candidates() {
        let fx = setup();
        seed(&fx.events, 1, "Rates rise", 5, 0.9, 3);
        seed(&fx.events, 2, "Rates fall", 6, 0.9, 2);
        seed(&fx.events, 3, "Rates stall", 24 * 8, 0.9, 5);

        let candidates = fx.aggregator.candidate_events(now()).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].title, "Rates rise");

        let run = fx
            .aggregator
            .detect_topics(now(), &CancellationToken::new())
            .unwrap();
        assert_eq!(run.summary.topics_created, 0);
    }

    #[test]
    fn test_embedding_failure_is_recorded() {
        let fx = setup();
        seed(&fx.events, 1, "Rates rise", 5, 0.9, 3);
        seed(&fx.events, 2, "Rates fall", 6, 0.8, 3);
        let unknown = seed(&fx.events, 3, "Unmapped headline", 7, 0.9, 3);

        let run = fx
            .aggregator
            .detect_topics(now(), &CancellationToken::new())
            .unwrap();
        assert_eq!(run.summary.topics_created, 1);
        assert_eq!(run.summary.errors.len(), 1);
        assert_eq!(run.summary.errors[0].item, unknown.event_id);
        assert_eq!(run.summary.errors[0].kind, ItemErrorKind::Embedding);
    }

    #[test]
    fn test_cancelled_run_creates_nothing() {
        let fx = setup();
        seed_week(&fx.events);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let run = fx.aggregator.detect_topics(now(), &cancel).unwrap();
        assert!(run.summary.cancelled);
        assert_eq!(run.summary.topics_created, 0);
        assert!(fx.topics.list_topics().unwrap().is_empty());
    }

    #[test]
    fn test_synthesized_id_is_deterministic() {
        let start = now() - Duration::days(2);
        let a = Event::new("A", "First", None, start, 0.5, start);
        let b = Event::new("B", "Second", None, start + Duration::days(1), 0.5, start);

        let one = synthesize_topic(&[&a, &b], now()).unwrap();
        let two = synthesize_topic(&[&b, &a], now()).unwrap();
        assert_eq!(one.topic_id, two.topic_id);
        // Confidence tie keeps the first member
        assert_eq!(one.name, "First");
        assert_eq!(
            one.description,
            "Topic covering 2 related events from 2024-03-06 to 2024-03-07"
        );
        assert!(synthesize_topic(&[], now()).is_none());
    }
}
