//! Event records.
//!
//! An event is one real-world occurrence inferred from similar articles.
//! Events are created by the lifecycle manager, mutated only by merges and
//! the staleness sweep, and never deleted.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event identifier (ULID string).
pub type EventId = String;

/// Event status.
///
/// `Active -> Active` on merge, `Active -> Inactive` on staleness sweep.
/// Nothing leaves `Inactive`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    /// Still accepting corroborating articles
    Active,
    /// Closed by the staleness sweep
    Inactive,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Active => "active",
            EventStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected news event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier (ULID)
    pub event_id: EventId,
    /// Representative headline
    pub title: String,
    /// Representative description
    pub description: Option<String>,
    /// Earliest publication time among member articles
    pub start_time: DateTime<Utc>,
    /// Lifecycle status
    pub status: EventStatus,
    /// Confidence in [0, 1]; never lowered by a merge
    pub confidence_score: f32,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last merge or status change
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Create a new active event.
    pub fn new(
        event_id: impl Into<EventId>,
        title: impl Into<String>,
        description: Option<String>,
        start_time: DateTime<Utc>,
        confidence_score: f32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            title: title.into(),
            description,
            start_time,
            status: EventStatus::Active,
            confidence_score: confidence_score.clamp(0.0, 1.0),
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if event is active.
    pub fn is_active(&self) -> bool {
        self.status == EventStatus::Active
    }

    /// Fold a merged candidate's confidence into this event.
    ///
    /// The score becomes `max(old, candidate)`. Returns true if it changed.
    pub fn absorb_confidence(&mut self, candidate: f32, now: DateTime<Utc>) -> bool {
        self.updated_at = now;
        let candidate = candidate.clamp(0.0, 1.0);
        if candidate > self.confidence_score {
            self.confidence_score = candidate;
            true
        } else {
            false
        }
    }

    /// Flip to inactive. Returns false if the event was already inactive.
    pub fn deactivate(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == EventStatus::Inactive {
            return false;
        }
        self.status = EventStatus::Inactive;
        self.updated_at = now;
        true
    }

    /// Title plus description, used for labeling and topic embeddings.
    pub fn text(&self) -> String {
        match self.description.as_deref().map(str::trim) {
            Some(desc) if !desc.is_empty() => format!("{} {}", self.title, desc),
            _ => self.title.clone(),
        }
    }
}

/// Membership of an article in an event, with the similarity that justified it.
///
/// Unique per `(event_id, article_id, source_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventArticleLink {
    pub event_id: EventId,
    pub article_id: String,
    pub source_id: String,
    pub similarity_score: f32,
    pub linked_at: DateTime<Utc>,
}

impl EventArticleLink {
    pub fn new(
        event_id: impl Into<EventId>,
        source_id: impl Into<String>,
        article_id: impl Into<String>,
        similarity_score: f32,
        linked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            article_id: article_id.into(),
            source_id: source_id.into(),
            similarity_score,
            linked_at,
        }
    }
}

/// Which labeling pass produced a label.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum LabelKind {
    /// Externally sourced category vocabulary
    Category,
    /// Fixed topic-class taxonomy
    TopicClass,
}

impl LabelKind {
    /// Short code used in storage keys.
    pub fn code(&self) -> &'static str {
        match self {
            LabelKind::Category => "cat",
            LabelKind::TopicClass => "cls",
        }
    }
}

/// A weighted label on an event, unique per `(event_id, kind, label)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLabel {
    pub event_id: EventId,
    pub kind: LabelKind,
    pub label: String,
    pub confidence_score: f32,
    pub updated_at: DateTime<Utc>,
}

impl EventLabel {
    pub fn new(
        event_id: impl Into<EventId>,
        kind: LabelKind,
        label: impl Into<String>,
        confidence_score: f32,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            kind,
            label: label.into(),
            confidence_score,
            updated_at,
        }
    }
}
