//! Topic records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::EventId;

/// A unique identifier for a topic.
pub type TopicId = String;

/// A higher-level grouping of related events. Derived, never user-edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    /// Unique identifier (ULID)
    pub topic_id: TopicId,
    /// Title of the highest-confidence member event
    pub name: String,
    /// Templated summary of cluster size and time span
    pub description: String,
    /// Mean confidence of member events
    pub confidence_score: f32,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Up to three categories carried by the most member events
    #[serde(default)]
    pub top_categories: Vec<String>,
    /// Up to three topic classes carried by the most member events
    #[serde(default)]
    pub top_classes: Vec<String>,
}

impl Topic {
    pub fn new(
        topic_id: impl Into<TopicId>,
        name: impl Into<String>,
        description: impl Into<String>,
        confidence_score: f32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            topic_id: topic_id.into(),
            name: name.into(),
            description: description.into(),
            confidence_score,
            created_at,
            top_categories: Vec::new(),
            top_classes: Vec::new(),
        }
    }

    pub fn with_top_labels(mut self, categories: Vec<String>, classes: Vec<String>) -> Self {
        self.top_categories = categories;
        self.top_classes = classes;
        self
    }
}

/// Membership of an event in a topic (many-to-many).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicEventLink {
    pub topic_id: TopicId,
    pub event_id: EventId,
}

impl TopicEventLink {
    pub fn new(topic_id: impl Into<TopicId>, event_id: impl Into<EventId>) -> Self {
        Self {
            topic_id: topic_id.into(),
            event_id: event_id.into(),
        }
    }
}

/// Directed parent -> child edge, unique per ordered pair.
///
/// A topic may have several parents and several children; the relation
/// graph is a DAG, not a tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicRelation {
    pub parent_topic_id: TopicId,
    pub child_topic_id: TopicId,
    pub confidence_score: f32,
    pub updated_at: DateTime<Utc>,
}

impl TopicRelation {
    pub fn new(
        parent_topic_id: impl Into<TopicId>,
        child_topic_id: impl Into<TopicId>,
        confidence_score: f32,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            parent_topic_id: parent_topic_id.into(),
            child_topic_id: child_topic_id.into(),
            confidence_score: confidence_score.clamp(0.0, 1.0),
            updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_confidence_clamped() {
        let rel = TopicRelation::new("a", "b", 1.2, Utc::now());
        assert!((rel.confidence_score - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_topic_serialization() {
        let topic = Topic::new("t1", "Rate hikes", "Topic covering 3 events", 0.8, Utc::now());
        let json = serde_json::to_string(&topic).unwrap();
        let decoded: Topic = serde_json::from_str(&json).unwrap();
        assert_eq!(topic, decoded);
    }

    #[test]
    fn test_topic_without_top_labels_deserializes() {
        let json = r#"{"topic_id":"t1","name":"Rate hikes","description":"d","confidence_score":0.8,"created_at":"2024-03-01T12:00:00Z"}"#;
        let topic: Topic = serde_json::from_str(json).unwrap();
        assert!(topic.top_categories.is_empty());
        assert!(topic.top_classes.is_empty());
    }
}
