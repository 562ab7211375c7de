//! Topic hierarchy inference.
//!
//! A topic is compared against every topic created strictly before it
//! (parent candidates) and strictly after it (child candidates). Edges
//! always point from the older topic to the younger one, so the relation
//! graph cannot contain a cycle. A topic may collect several parents and
//! several children.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use news_embeddings::{Embedding, EmbeddingModel};
use news_events::EventStorage;
use news_types::{ItemError, RunSummary, Topic, TopicId, TopicRelation};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::HierarchyConfig;
use crate::error::TopicsError;
use crate::profile::topic_profile;
use crate::storage::TopicStorage;

/// Infers parent/child relations between topics.
pub struct TopicHierarchy {
    events: Arc<EventStorage>,
    store: Arc<TopicStorage>,
    model: Arc<dyn EmbeddingModel>,
    config: HierarchyConfig,
}

/// Topic embeddings cached for one classification pass.
#[derive(Default)]
struct ProfileCache {
    embeddings: HashMap<TopicId, Embedding>,
}

impl TopicHierarchy {
    /// Create a classifier. Fails on invalid configuration.
    pub fn new(
        events: Arc<EventStorage>,
        store: Arc<TopicStorage>,
        model: Arc<dyn EmbeddingModel>,
        config: HierarchyConfig,
    ) -> Result<Self, TopicsError> {
        config.validate()?;
        Ok(Self {
            events,
            store,
            model,
            config,
        })
    }

    fn embedding<'a>(
        &self,
        cache: &'a mut ProfileCache,
        topic: &Topic,
    ) -> Result<&'a Embedding, TopicsError> {
        if !cache.embeddings.contains_key(&topic.topic_id) {
            let text = topic_profile(&self.events, &self.store, topic)?;
            let embedding = self.model.embed(&text)?;
            cache.embeddings.insert(topic.topic_id.clone(), embedding);
        }
        cache
            .embeddings
            .get(&topic.topic_id)
            .ok_or_else(|| TopicsError::NotFound(topic.topic_id.clone()))
    }

    /// Classify one topic against all others.
    #[instrument(skip(self))]
    pub fn classify_topic(&self, topic_id: &str, now: DateTime<Utc>) -> RunSummary {
        let mut summary = RunSummary::begin("classify_topic", now);
        match self.store.list_topics() {
            Ok(all) => {
                let mut cache = ProfileCache::default();
                self.classify_one(topic_id, &all, &mut cache, now, &mut summary);
            }
            Err(e) => {
                warn!(topic_id, error = %e, "Cannot list topics");
                summary.record_error(ItemError::new(topic_id, e.item_kind(), e.to_string()));
            }
        }
        summary.finish(now)
    }

    /// Classify the given topics, sharing embeddings across them.
    pub fn classify_topics(
        &self,
        topic_ids: &[TopicId],
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, TopicsError> {
        let mut summary = RunSummary::begin("classify_topics", now);
        let all = self.store.list_topics()?;
        let mut cache = ProfileCache::default();

        for topic_id in topic_ids {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            self.classify_one(topic_id, &all, &mut cache, now, &mut summary);
        }

        info!(
            topics = topic_ids.len(),
            relations = summary.relations_added,
            errors = summary.errors.len(),
            "Topic classification complete"
        );
        Ok(summary.finish(now))
    }

    /// Classify every stored topic.
    pub fn classify_all(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, TopicsError> {
        let ids: Vec<TopicId> = self
            .store
            .list_topics()?
            .into_iter()
            .map(|t| t.topic_id)
            .collect();
        let mut summary = self.classify_topics(&ids, now, cancel)?;
        summary.operation = "classify_all".to_string();
        Ok(summary)
    }

    fn classify_one(
        &self,
        topic_id: &str,
        all: &[Topic],
        cache: &mut ProfileCache,
        now: DateTime<Utc>,
        summary: &mut RunSummary,
    ) {
        let topic = match all.iter().find(|t| t.topic_id == topic_id) {
            Some(topic) => topic,
            None => {
                warn!(topic_id, "Topic not found");
                summary.record_error(ItemError::new(
                    topic_id,
                    news_types::ItemErrorKind::Invariant,
                    format!("Topic not found: {}", topic_id),
                ));
                return;
            }
        };
        let target = match self.embedding(cache, topic) {
            Ok(embedding) => embedding.clone(),
            Err(e) => {
                warn!(topic_id, error = %e, "Skipping topic, embedding failed");
                summary.record_error(ItemError::new(topic_id, e.item_kind(), e.to_string()));
                return;
            }
        };

        for other in all {
            let older = other.created_at < topic.created_at;
            let younger = other.created_at > topic.created_at;
            if !older && !younger {
                continue;
            }

            let similarity = match self.embedding(cache, other) {
                Ok(embedding) => target.cosine_similarity(embedding),
                Err(e) => {
                    warn!(topic_id = %other.topic_id, error = %e, "Skipping candidate, embedding failed");
                    summary.record_error(ItemError::new(
                        &other.topic_id,
                        e.item_kind(),
                        e.to_string(),
                    ));
                    continue;
                }
            };

            let relation = if older && similarity >= self.config.parent_threshold {
                TopicRelation::new(&other.topic_id, &topic.topic_id, similarity, now)
            } else if younger && similarity >= self.config.child_threshold {
                TopicRelation::new(&topic.topic_id, &other.topic_id, similarity, now)
            } else {
                continue;
            };

            match self.store.put_relation(&relation) {
                Ok(true) => {
                    debug!(
                        parent = %relation.parent_topic_id,
                        child = %relation.child_topic_id,
                        similarity,
                        "Added relation"
                    );
                    summary.relations_added += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(topic_id, error = %e, "Relation write failed");
                    summary.record_error(ItemError::new(topic_id, e.item_kind(), e.to_string()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use news_embeddings::TableEmbedder;
    use news_storage::Storage;
    use news_types::ItemErrorKind;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const DIM: usize = 4;

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    /// Alpha/Omega share axis 0. Beta is 0.75 from Alpha, Gamma 0.85, and
    /// Beta/Gamma are 0.6375 apart.
    fn model() -> Arc<dyn EmbeddingModel> {
        Arc::new(
            TableEmbedder::new(DIM)
                .with_rule("Omega", TableEmbedder::axis(DIM, 0))
                .with_rule("Alpha", TableEmbedder::axis(DIM, 0))
                .with_rule("Beta", TableEmbedder::blend(DIM, 0, 1, 0.75))
                .with_rule("Gamma", TableEmbedder::blend(DIM, 0, 2, 0.85)),
        )
    }

    fn setup(names: &[(&str, i64)]) -> (TopicHierarchy, Arc<TopicStorage>, TempDir) {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());
        let events = Arc::new(EventStorage::new(storage.clone()));
        let topics = Arc::new(TopicStorage::new(storage));
        for (name, d) in names {
            let topic = Topic::new(*name, *name, "Topic covering 3 related events", 0.8, day(*d));
            topics.create_topic(&topic, &[format!("{}-event", name)]).unwrap();
        }
        let hierarchy =
            TopicHierarchy::new(events, topics.clone(), model(), HierarchyConfig::default())
                .unwrap();
        (hierarchy, topics, temp)
    }

    fn children(store: &TopicStorage, id: &str) -> Vec<String> {
        store
            .children_of(id)
            .unwrap()
            .into_iter()
            .map(|r| r.child_topic_id)
            .collect()
    }

    #[test]
    fn test_child_threshold_applies_to_younger_topics() {
        let (hierarchy, store, _temp) = setup(&[("Alpha", 1), ("Beta", 2), ("Gamma", 3)]);

        let summary = hierarchy.classify_topic("Alpha", day(4));
        assert_eq!(summary.relations_added, 2);
        assert_eq!(children(&store, "Alpha"), vec!["Beta", "Gamma"]);
    }

    #[test]
    fn test_parent_threshold_is_stricter() {
        let (hierarchy, store, _temp) = setup(&[("Alpha", 1), ("Beta", 2), ("Gamma", 3)]);

        // Alpha is 0.75 from Beta: enough for a child, not for a parent
        let summary = hierarchy.classify_topic("Beta", day(4));
        assert_eq!(summary.relations_added, 0);
        assert!(store.parents_of("Beta").unwrap().is_empty());

        let summary = hierarchy.classify_topic("Gamma", day(4));
        assert_eq!(summary.relations_added, 1);
        let parents = store.parents_of("Gamma").unwrap();
        assert_eq!(parents.len(), 1);
        assert_eq!(parents[0].parent_topic_id, "Alpha");
        assert!((parents[0].confidence_score - 0.85).abs() < 1e-5);
    }

    #[test]
    fn test_classify_all_builds_dag_with_multiple_parents() {
        let (hierarchy, store, _temp) =
            setup(&[("Omega", 0), ("Alpha", 1), ("Beta", 2), ("Gamma", 3)]);

        let summary = hierarchy
            .classify_all(day(4), &CancellationToken::new())
            .unwrap();
        assert_eq!(summary.relations_added, 5);
        assert!(summary.errors.is_empty());

        let mut parents: Vec<String> = store
            .parents_of("Gamma")
            .unwrap()
            .into_iter()
            .map(|r| r.parent_topic_id)
            .collect();
        parents.sort();
        assert_eq!(parents, vec!["Alpha", "Omega"]);

        let topics = store.list_topics().unwrap();
        let created: HashMap<&str, DateTime<Utc>> = topics
            .iter()
            .map(|t| (t.topic_id.as_str(), t.created_at))
            .collect();
        for topic in &topics {
            for rel in store.children_of(&topic.topic_id).unwrap() {
                assert!(created[rel.parent_topic_id.as_str()] < created[rel.child_topic_id.as_str()]);
            }
        }

        // Re-running adds nothing new
        let again = hierarchy
            .classify_all(day(5), &CancellationToken::new())
            .unwrap();
        assert_eq!(again.relations_added, 0);
    }

    #[test]
    fn test_same_instant_topics_are_not_related() {
        let (hierarchy, store, _temp) = setup(&[("Alpha", 1), ("Omega", 1)]);
        let summary = hierarchy.classify_topic("Alpha", day(2));
        assert_eq!(summary.relations_added, 0);
        assert!(children(&store, "Omega").is_empty());
    }

    #[test]
    fn test_missing_topic_is_recorded() {
        let (hierarchy, _store, _temp) = setup(&[("Alpha", 1)]);
        let summary = hierarchy.classify_topic("nope", day(2));
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].kind, ItemErrorKind::Invariant);
    }
}
