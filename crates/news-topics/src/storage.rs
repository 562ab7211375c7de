//! Topic storage operations.
//!
//! Manages topics, event memberships and parent/child relations in RocksDB
//! column families. A topic and all of its memberships are written in one
//! batch.

use std::sync::Arc;

use news_storage::column_families::{CF_TOPICS, CF_TOPIC_EVENTS, CF_TOPIC_RELS};
use news_storage::{Storage, StorageBatch};
use news_types::{EventId, Topic, TopicEventLink, TopicId, TopicRelation};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use crate::error::TopicsError;

/// Key format for topics: topic:{topic_id}
pub fn topic_key(topic_id: &str) -> String {
    format!("topic:{}", topic_id)
}

/// Member-set index: members:{fingerprint} -> topic_id
pub fn members_key(fingerprint: &str) -> String {
    format!("members:{}", fingerprint)
}

/// Key format for memberships: topic:{topic_id}:{event_id}
pub fn topic_event_key(topic_id: &str, event_id: &str) -> String {
    format!("topic:{}:{}", topic_id, event_id)
}

/// Secondary index: event:{event_id}:{topic_id}
pub fn event_topic_key(event_id: &str, topic_id: &str) -> String {
    format!("event:{}:{}", event_id, topic_id)
}

/// Key format for relations: parent:{parent_id}:{child_id}
pub fn relation_key(parent_id: &str, child_id: &str) -> String {
    format!("parent:{}:{}", parent_id, child_id)
}

/// Reverse index: child:{child_id}:{parent_id}
pub fn reverse_relation_key(child_id: &str, parent_id: &str) -> String {
    format!("child:{}:{}", child_id, parent_id)
}

/// Stable fingerprint of a member set, independent of input order.
pub fn member_fingerprint(event_ids: &[EventId]) -> String {
    let mut sorted: Vec<&str> = event_ids.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.dedup();

    let mut hasher = Sha256::new();
    for id in sorted {
        hasher.update(id.as_bytes());
        hasher.update(b"\n");
    }
    hasher
        .finalize()
        .iter()
        .take(16)
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Topic storage interface.
pub struct TopicStorage {
    storage: Arc<Storage>,
}

impl TopicStorage {
    /// Create a new topic storage wrapper.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Get underlying storage.
    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    // --- Topics ---

    /// Persist a topic with its member events and member-set index.
    #[instrument(skip(self, topic, members), fields(topic_id = %topic.topic_id, members = members.len()))]
    pub fn create_topic(&self, topic: &Topic, members: &[EventId]) -> Result<(), TopicsError> {
        let mut batch = StorageBatch::new();
        batch.put(
            CF_TOPICS,
            topic_key(&topic.topic_id).into_bytes(),
            serde_json::to_vec(topic)?,
        );
        batch.put(
            CF_TOPICS,
            members_key(&member_fingerprint(members)).into_bytes(),
            topic.topic_id.clone().into_bytes(),
        );
        for event_id in members {
            let value = serde_json::to_vec(&TopicEventLink::new(&topic.topic_id, event_id))?;
            batch.put(
                CF_TOPIC_EVENTS,
                topic_event_key(&topic.topic_id, event_id).into_bytes(),
                value.clone(),
            );
            batch.put(
                CF_TOPIC_EVENTS,
                event_topic_key(event_id, &topic.topic_id).into_bytes(),
                value,
            );
        }
        self.storage.write(batch)?;
        debug!("Created topic");
        Ok(())
    }

    /// Get a topic by ID.
    #[instrument(skip(self))]
    pub fn get_topic(&self, topic_id: &str) -> Result<Option<Topic>, TopicsError> {
        match self.storage.get(CF_TOPICS, topic_key(topic_id).as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Get a topic that must exist.
    pub fn require_topic(&self, topic_id: &str) -> Result<Topic, TopicsError> {
        self.get_topic(topic_id)?
            .ok_or_else(|| TopicsError::NotFound(topic_id.to_string()))
    }

    /// Topic already created for exactly this member set, if any.
    pub fn topic_for_members(&self, members: &[EventId]) -> Result<Option<TopicId>, TopicsError> {
        let key = members_key(&member_fingerprint(members));
        match self.storage.get(CF_TOPICS, key.as_bytes())? {
            Some(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            None => Ok(None),
        }
    }

    /// All topics, ordered by creation time.
    pub fn list_topics(&self) -> Result<Vec<Topic>, TopicsError> {
        let mut topics = Vec::new();
        for (_, value) in self.storage.prefix_iterator(CF_TOPICS, b"topic:")? {
            topics.push(serde_json::from_slice::<Topic>(&value)?);
        }
        topics.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.topic_id.cmp(&b.topic_id))
        });
        Ok(topics)
    }

    // --- Memberships ---

    /// Member events of a topic.
    pub fn events_for_topic(&self, topic_id: &str) -> Result<Vec<EventId>, TopicsError> {
        let prefix = format!("topic:{}:", topic_id);
        let mut events = Vec::new();
        for (_, value) in self
            .storage
            .prefix_iterator(CF_TOPIC_EVENTS, prefix.as_bytes())?
        {
            let link: TopicEventLink = serde_json::from_slice(&value)?;
            events.push(link.event_id);
        }
        Ok(events)
    }

    /// Topics an event belongs to.
    pub fn topics_for_event(&self, event_id: &str) -> Result<Vec<TopicId>, TopicsError> {
        let prefix = format!("event:{}:", event_id);
        let mut topics = Vec::new();
        for (_, value) in self
            .storage
            .prefix_iterator(CF_TOPIC_EVENTS, prefix.as_bytes())?
        {
            let link: TopicEventLink = serde_json::from_slice(&value)?;
            topics.push(link.topic_id);
        }
        Ok(topics)
    }

    // --- Relations ---

    /// Upsert a parent -> child relation.
    ///
    /// Returns true if the edge did not exist before.
    #[instrument(skip(self, rel), fields(parent = %rel.parent_topic_id, child = %rel.child_topic_id))]
    pub fn put_relation(&self, rel: &TopicRelation) -> Result<bool, TopicsError> {
        let key = relation_key(&rel.parent_topic_id, &rel.child_topic_id);
        let is_new = !self.storage.contains(CF_TOPIC_RELS, key.as_bytes())?;

        let value = serde_json::to_vec(rel)?;
        let mut batch = StorageBatch::new();
        batch.put(CF_TOPIC_RELS, key.into_bytes(), value.clone());
        batch.put(
            CF_TOPIC_RELS,
            reverse_relation_key(&rel.child_topic_id, &rel.parent_topic_id).into_bytes(),
            value,
        );
        self.storage.write(batch)?;
        debug!(is_new, "Stored relation");
        Ok(is_new)
    }

    /// Relations where `topic_id` is the child.
    pub fn parents_of(&self, topic_id: &str) -> Result<Vec<TopicRelation>, TopicsError> {
        self.relations_with_prefix(&format!("child:{}:", topic_id))
    }

    /// Relations where `topic_id` is the parent.
    pub fn children_of(&self, topic_id: &str) -> Result<Vec<TopicRelation>, TopicsError> {
        self.relations_with_prefix(&format!("parent:{}:", topic_id))
    }

    fn relations_with_prefix(&self, prefix: &str) -> Result<Vec<TopicRelation>, TopicsError> {
        let mut relations = Vec::new();
        for (_, value) in self
            .storage
            .prefix_iterator(CF_TOPIC_RELS, prefix.as_bytes())?
        {
            relations.push(serde_json::from_slice(&value)?);
        }
        Ok(relations)
    }

    /// Entity counts.
    pub fn stats(&self) -> Result<TopicStats, TopicsError> {
        Ok(TopicStats {
            topics: self.storage.count_prefix(CF_TOPICS, b"topic:")?,
            memberships: self.storage.count_prefix(CF_TOPIC_EVENTS, b"topic:")?,
            relations: self.storage.count_prefix(CF_TOPIC_RELS, b"parent:")?,
        })
    }
}

/// Topic counts for status reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TopicStats {
    pub topics: u64,
    pub memberships: u64,
    pub relations: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn setup() -> (TopicStorage, TempDir) {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());
        (TopicStorage::new(storage), temp)
    }

    fn ids(values: &[&str]) -> Vec<EventId> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn topic(id: &str, hours: i64) -> Topic {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::hours(hours);
        Topic::new(id, format!("Topic {}", id), "Topic covering 2 related events", 0.8, at)
    }

    #[test]
    fn test_fingerprint_ignores_order() {
        assert_eq!(
            member_fingerprint(&ids(&["b", "a", "c"])),
            member_fingerprint(&ids(&["c", "b", "a"]))
        );
        assert_ne!(
            member_fingerprint(&ids(&["a", "b"])),
            member_fingerprint(&ids(&["a", "b", "c"]))
        );
    }

    #[test]
    fn test_create_and_read_topic() {
        let (store, _temp) = setup();
        let t = topic("T1", 0);
        store.create_topic(&t, &ids(&["e1", "e2"])).unwrap();

        assert_eq!(store.get_topic("T1").unwrap(), Some(t));
        assert_eq!(store.events_for_topic("T1").unwrap(), ids(&["e1", "e2"]));
        assert_eq!(store.topics_for_event("e2").unwrap(), vec!["T1".to_string()]);
        assert_eq!(
            store.topic_for_members(&ids(&["e2", "e1"])).unwrap(),
            Some("T1".to_string())
        );
        assert_eq!(store.topic_for_members(&ids(&["e1"])).unwrap(), None);
        assert!(store.require_topic("missing").is_err());
    }

    #[test]
    fn test_list_topics_excludes_index_rows() {
        let (store, _temp) = setup();
        store.create_topic(&topic("T2", 5), &ids(&["e3"])).unwrap();
        store.create_topic(&topic("T1", 1), &ids(&["e1", "e2"])).unwrap();

        let listed: Vec<String> = store
            .list_topics()
            .unwrap()
            .into_iter()
            .map(|t| t.topic_id)
            .collect();
        assert_eq!(listed, vec!["T1", "T2"]);
    }

    #[test]
    fn test_relations_both_directions() {
        let (store, _temp) = setup();
        let now = Utc::now();

        assert!(store.put_relation(&TopicRelation::new("A", "C", 0.9, now)).unwrap());
        assert!(store.put_relation(&TopicRelation::new("B", "C", 0.85, now)).unwrap());
        assert!(!store.put_relation(&TopicRelation::new("A", "C", 0.95, now)).unwrap());

        let parents = store.parents_of("C").unwrap();
        assert_eq!(parents.len(), 2);
        assert!((parents[0].confidence_score - 0.95).abs() < 1e-6);

        let children = store.children_of("A").unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].child_topic_id, "C");
    }

    #[test]
    fn test_stats() {
        let (store, _temp) = setup();
        store.create_topic(&topic("T1", 0), &ids(&["e1", "e2"])).unwrap();
        store
            .put_relation(&TopicRelation::new("T0", "T1", 0.9, Utc::now()))
            .unwrap();

        assert_eq!(
            store.stats().unwrap(),
            TopicStats {
                topics: 1,
                memberships: 2,
                relations: 1
            }
        );
    }
}
