//! Run summaries returned by every public pipeline operation.
//!
//! A run always completes and reports counts, even under partial failure.
//! Failed or skipped items are enumerated, never silently dropped.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::article::ArticleRef;

/// Classification of a per-item failure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemErrorKind {
    /// Embedding provider failed for this item
    Embedding,
    /// Record excluded for missing or malformed fields
    DataQuality,
    /// Persistence failed for this unit of work
    Storage,
    /// Unit abandoned because an invariant did not hold
    Invariant,
}

impl fmt::Display for ItemErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ItemErrorKind::Embedding => "embedding",
            ItemErrorKind::DataQuality => "data_quality",
            ItemErrorKind::Storage => "storage",
            ItemErrorKind::Invariant => "invariant",
        };
        f.write_str(s)
    }
}

/// A single item that failed or was skipped during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    /// Item key (article ref, event id, topic id, ...)
    pub item: String,
    pub kind: ItemErrorKind,
    pub message: String,
}

impl ItemError {
    pub fn new(item: impl Into<String>, kind: ItemErrorKind, message: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Counters and failures for one invocation of a pipeline operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Operation name (e.g. "detect_and_merge_events")
    pub operation: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub articles_seen: usize,
    pub candidate_groups: usize,
    pub events_created: usize,
    pub events_merged: usize,
    pub events_deactivated: usize,
    pub events_labeled: usize,
    pub labels_written: usize,
    /// Stored labels that no longer meet their threshold
    #[serde(default)]
    pub labels_removed: usize,
    #[serde(default)]
    pub events_analyzed: usize,
    pub topics_created: usize,
    pub topics_existing: usize,
    pub relations_added: usize,
    /// Articles that found no similar neighbor in their window
    #[serde(default)]
    pub ungrouped: Vec<ArticleRef>,
    #[serde(default)]
    pub errors: Vec<ItemError>,
    /// True if the run stopped early at a cooperative checkpoint
    #[serde(default)]
    pub cancelled: bool,
}

impl RunSummary {
    /// Start a summary for the named operation.
    pub fn begin(operation: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            operation: operation.into(),
            started_at: Some(now),
            ..Default::default()
        }
    }

    /// Record a per-item failure.
    pub fn record_error(&mut self, error: ItemError) {
        self.errors.push(error);
    }

    /// Mark the run as finished.
    pub fn finish(mut self, now: DateTime<Utc>) -> Self {
        self.finished_at = Some(now);
        self
    }

    /// Fold another summary's counters and failures into this one.
    pub fn absorb(&mut self, other: RunSummary) {
        self.articles_seen += other.articles_seen;
        self.candidate_groups += other.candidate_groups;
        self.events_created += other.events_created;
        self.events_merged += other.events_merged;
        self.events_deactivated += other.events_deactivated;
        self.events_labeled += other.events_labeled;
        self.labels_written += other.labels_written;
        self.labels_removed += other.labels_removed;
        self.events_analyzed += other.events_analyzed;
        self.topics_created += other.topics_created;
        self.topics_existing += other.topics_existing;
        self.relations_added += other.relations_added;
        self.ungrouped.extend(other.ungrouped);
        self.errors.extend(other.errors);
        self.cancelled |= other.cancelled;
    }

    /// Number of errors of a given kind.
    pub fn error_count(&self, kind: ItemErrorKind) -> usize {
        self.errors.iter().filter(|e| e.kind == kind).count()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_and_finish() {
        let now = Utc::now();
        let summary = RunSummary::begin("sweep_stale_events", now).finish(now);
        assert_eq!(summary.operation, "sweep_stale_events");
        assert_eq!(summary.started_at, Some(now));
        assert_eq!(summary.finished_at, Some(now));
        assert!(!summary.has_errors());
    }

    #[test]
    fn test_absorb_merges_counters() {
        let now = Utc::now();
        let mut a = RunSummary::begin("topic_cycle", now);
        a.topics_created = 2;
        a.record_error(ItemError::new("t1", ItemErrorKind::Embedding, "timeout"));

        let mut b = RunSummary::begin("classify_topic", now);
        b.relations_added = 3;
        b.cancelled = true;
        b.record_error(ItemError::new("t2", ItemErrorKind::Storage, "conflict"));

        a.absorb(b);
        assert_eq!(a.operation, "topic_cycle");
        assert_eq!(a.topics_created, 2);
        assert_eq!(a.relations_added, 3);
        assert!(a.cancelled);
        assert_eq!(a.errors.len(), 2);
        assert_eq!(a.error_count(ItemErrorKind::Storage), 1);
    }

    #[test]
    fn test_item_error_kind_display() {
        assert_eq!(ItemErrorKind::DataQuality.to_string(), "data_quality");
    }
}
