//! Event storage operations.
//!
//! Manages events, article links and labels in RocksDB column families.
//! Every mutation of one event is a single atomic batch.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use news_storage::column_families::{
    CF_EVENTS, CF_EVENT_ANALYSES, CF_EVENT_ARTICLES, CF_EVENT_LABELS,
};
use news_storage::{Storage, StorageBatch};
use news_types::{Article, ArticleRef, Event, EventArticleLink, EventId, EventLabel, EventStatus};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use ulid::Ulid;

use crate::analysis::EventAnalysis;
use crate::error::EventsError;

/// Key format for events: event:{event_id}
///
/// Event ids are ULIDs whose time part is the event's start time, so key
/// order is start-time order.
pub fn event_key(event_id: &str) -> String {
    format!("event:{}", event_id)
}

/// Key format for links: link:{event_id}:{source_id}:{article_id}
pub fn event_link_key(event_id: &str, source_id: &str, article_id: &str) -> String {
    format!("link:{}:{}:{}", event_id, source_id, article_id)
}

/// Secondary index: article:{source_id}:{article_id}:{event_id}
pub fn article_event_key(source_id: &str, article_id: &str, event_id: &str) -> String {
    format!("article:{}:{}:{}", source_id, article_id, event_id)
}

/// Key format for labels: label:{event_id}:{kind}:{label}
pub fn label_key(label: &EventLabel) -> String {
    format!(
        "label:{}:{}:{}",
        label.event_id,
        label.kind.code(),
        label.label
    )
}

/// Key format for analyses: analysis:{event_id}
pub fn analysis_key(event_id: &str) -> String {
    format!("analysis:{}", event_id)
}

/// Position of the last article a detection run processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    pub published_at: DateTime<Utc>,
    pub source_id: String,
    pub article_id: String,
}

impl Watermark {
    pub fn from_article(article: &Article) -> Self {
        Self {
            published_at: article.published_at,
            source_id: article.source_id.clone(),
            article_id: article.article_id.clone(),
        }
    }

    /// True if `article` sorts strictly after this watermark.
    pub fn is_before(&self, article: &Article) -> bool {
        (
            self.published_at,
            self.source_id.as_str(),
            self.article_id.as_str(),
        ) < article.order_key()
    }
}

/// Event storage interface.
pub struct EventStorage {
    storage: Arc<Storage>,
}

impl EventStorage {
    /// Create a new event storage wrapper.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Get underlying storage.
    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    // --- Events ---

    /// Get an event by ID.
    #[instrument(skip(self))]
    pub fn get_event(&self, event_id: &str) -> Result<Option<Event>, EventsError> {
        match self.storage.get(CF_EVENTS, event_key(event_id).as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Get an event that must exist.
    pub fn require_event(&self, event_id: &str) -> Result<Event, EventsError> {
        self.get_event(event_id)?
            .ok_or_else(|| EventsError::NotFound(event_id.to_string()))
    }

    /// Check whether an event id is taken.
    pub fn event_exists(&self, event_id: &str) -> Result<bool, EventsError> {
        Ok(self
            .storage
            .contains(CF_EVENTS, event_key(event_id).as_bytes())?)
    }

    /// List events ordered by start time, optionally filtered by status.
    pub fn list_events(&self, status: Option<EventStatus>) -> Result<Vec<Event>, EventsError> {
        let mut events = Vec::new();
        for (_, value) in self.storage.prefix_iterator(CF_EVENTS, b"event:")? {
            let event: Event = serde_json::from_slice(&value)?;
            if status.map_or(true, |s| event.status == s) {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Events whose start time is at or after `since`, ordered by start time.
    pub fn events_started_since(&self, since: DateTime<Utc>) -> Result<Vec<Event>, EventsError> {
        let since_ms = since.timestamp_millis().max(0) as u64;
        let lower = event_key(&Ulid::from_parts(since_ms, 0).to_string());

        let mut events = Vec::new();
        // ';' sorts right after ':' so this bounds the scan to event keys
        for (_, value) in self
            .storage
            .range_iterator(CF_EVENTS, lower.as_bytes(), b"event;")?
        {
            let event: Event = serde_json::from_slice(&value)?;
            if event.start_time >= since {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Active events with start time at or after `since`.
    pub fn active_events_since(&self, since: DateTime<Utc>) -> Result<Vec<Event>, EventsError> {
        let mut events = self.events_started_since(since)?;
        events.retain(Event::is_active);
        Ok(events)
    }

    /// Events updated strictly after `since`.
    pub fn events_updated_since(&self, since: DateTime<Utc>) -> Result<Vec<Event>, EventsError> {
        let mut events = self.list_events(None)?;
        events.retain(|e| e.updated_at > since);
        Ok(events)
    }

    /// Persist a new event and its links in one batch.
    #[instrument(skip(self, event, links), fields(event_id = %event.event_id, links = links.len()))]
    pub fn create_event(&self, event: &Event, links: &[EventArticleLink]) -> Result<(), EventsError> {
        let mut batch = StorageBatch::new();
        batch.put(
            CF_EVENTS,
            event_key(&event.event_id).into_bytes(),
            serde_json::to_vec(event)?,
        );
        Self::queue_links(&mut batch, links)?;
        self.storage.write(batch)?;
        debug!("Created event");
        Ok(())
    }

    /// Persist an updated event and any new links in one batch.
    #[instrument(skip(self, event, new_links), fields(event_id = %event.event_id, links = new_links.len()))]
    pub fn update_event(
        &self,
        event: &Event,
        new_links: &[EventArticleLink],
    ) -> Result<(), EventsError> {
        let mut batch = StorageBatch::new();
        batch.put(
            CF_EVENTS,
            event_key(&event.event_id).into_bytes(),
            serde_json::to_vec(event)?,
        );
        Self::queue_links(&mut batch, new_links)?;
        self.storage.write(batch)?;
        debug!("Updated event");
        Ok(())
    }

    fn queue_links(batch: &mut StorageBatch, links: &[EventArticleLink]) -> Result<(), EventsError> {
        for link in links {
            let value = serde_json::to_vec(link)?;
            batch.put(
                CF_EVENT_ARTICLES,
                event_link_key(&link.event_id, &link.source_id, &link.article_id).into_bytes(),
                value.clone(),
            );
            batch.put(
                CF_EVENT_ARTICLES,
                article_event_key(&link.source_id, &link.article_id, &link.event_id).into_bytes(),
                value,
            );
        }
        Ok(())
    }

    // --- Links ---

    /// Check whether an article is already linked to an event.
    pub fn has_link(&self, event_id: &str, article: &ArticleRef) -> Result<bool, EventsError> {
        let key = event_link_key(event_id, &article.source_id, &article.article_id);
        Ok(self.storage.contains(CF_EVENT_ARTICLES, key.as_bytes())?)
    }

    /// Get links for an event, in article key order.
    pub fn links_for_event(&self, event_id: &str) -> Result<Vec<EventArticleLink>, EventsError> {
        let prefix = format!("link:{}:", event_id);
        let mut links = Vec::new();
        for (_, value) in self
            .storage
            .prefix_iterator(CF_EVENT_ARTICLES, prefix.as_bytes())?
        {
            links.push(serde_json::from_slice(&value)?);
        }
        Ok(links)
    }

    /// Get the events an article is linked to.
    pub fn events_for_article(&self, article: &ArticleRef) -> Result<Vec<EventId>, EventsError> {
        let prefix = format!("article:{}:{}:", article.source_id, article.article_id);
        let mut event_ids = Vec::new();
        for (_, value) in self
            .storage
            .prefix_iterator(CF_EVENT_ARTICLES, prefix.as_bytes())?
        {
            let link: EventArticleLink = serde_json::from_slice(&value)?;
            // An article id containing ':' can share a prefix with another
            if link.source_id == article.source_id && link.article_id == article.article_id {
                event_ids.push(link.event_id);
            }
        }
        Ok(event_ids)
    }

    /// Number of articles linked to an event.
    pub fn article_count(&self, event_id: &str) -> Result<u64, EventsError> {
        let prefix = format!("link:{}:", event_id);
        Ok(self
            .storage
            .count_prefix(CF_EVENT_ARTICLES, prefix.as_bytes())?)
    }

    // --- Labels ---

    /// Upsert labels in one batch, overwriting confidence on conflict.
    pub fn upsert_labels(&self, labels: &[EventLabel]) -> Result<(), EventsError> {
        let mut batch = StorageBatch::new();
        for label in labels {
            batch.put(
                CF_EVENT_LABELS,
                label_key(label).into_bytes(),
                serde_json::to_vec(label)?,
            );
        }
        self.storage.write(batch)?;
        Ok(())
    }

    /// Make `labels` the complete label set of an event in one batch.
    ///
    /// Labels in the new set are upserted; stored labels of the event that
    /// are not in it are deleted. Returns the number of deleted labels.
    pub fn replace_labels(
        &self,
        event_id: &str,
        labels: &[EventLabel],
    ) -> Result<usize, EventsError> {
        if let Some(foreign) = labels.iter().find(|l| l.event_id != event_id) {
            return Err(EventsError::Invariant(format!(
                "label for {} in label set of {}",
                foreign.event_id, event_id
            )));
        }

        let keep: HashSet<String> = labels.iter().map(label_key).collect();
        let prefix = format!("label:{}:", event_id);
        let mut batch = StorageBatch::new();
        let mut removed = 0;

        for (key, _) in self
            .storage
            .prefix_iterator(CF_EVENT_LABELS, prefix.as_bytes())?
        {
            if !keep.contains(String::from_utf8_lossy(&key).as_ref()) {
                batch.delete(CF_EVENT_LABELS, key);
                removed += 1;
            }
        }
        for label in labels {
            batch.put(
                CF_EVENT_LABELS,
                label_key(label).into_bytes(),
                serde_json::to_vec(label)?,
            );
        }

        self.storage.write(batch)?;
        Ok(removed)
    }

    /// Get labels for an event, categories first.
    pub fn labels_for_event(&self, event_id: &str) -> Result<Vec<EventLabel>, EventsError> {
        let prefix = format!("label:{}:", event_id);
        let mut labels: Vec<EventLabel> = Vec::new();
        for (_, value) in self
            .storage
            .prefix_iterator(CF_EVENT_LABELS, prefix.as_bytes())?
        {
            labels.push(serde_json::from_slice(&value)?);
        }
        labels.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.label.cmp(&b.label)));
        Ok(labels)
    }

    // --- Analyses ---

    /// Store an event's analysis, replacing any previous one.
    pub fn put_analysis(&self, analysis: &EventAnalysis) -> Result<(), EventsError> {
        self.storage.put(
            CF_EVENT_ANALYSES,
            analysis_key(&analysis.event_id).as_bytes(),
            &serde_json::to_vec(analysis)?,
        )?;
        debug!(event_id = %analysis.event_id, "Stored analysis");
        Ok(())
    }

    /// Get the latest analysis of an event.
    pub fn get_analysis(&self, event_id: &str) -> Result<Option<EventAnalysis>, EventsError> {
        match self
            .storage
            .get(CF_EVENT_ANALYSES, analysis_key(event_id).as_bytes())?
        {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    // --- Checkpoints ---

    /// Read a named watermark.
    pub fn get_watermark(&self, name: &str) -> Result<Option<Watermark>, EventsError> {
        match self.storage.get_checkpoint(name)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Persist a named watermark.
    pub fn put_watermark(&self, name: &str, watermark: &Watermark) -> Result<(), EventsError> {
        self.storage
            .put_checkpoint(name, &serde_json::to_vec(watermark)?)?;
        Ok(())
    }

    /// Read a named timestamp checkpoint.
    pub fn get_time_checkpoint(&self, name: &str) -> Result<Option<DateTime<Utc>>, EventsError> {
        match self.storage.get_checkpoint(name)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Persist a named timestamp checkpoint.
    pub fn put_time_checkpoint(&self, name: &str, at: DateTime<Utc>) -> Result<(), EventsError> {
        self.storage.put_checkpoint(name, &serde_json::to_vec(&at)?)?;
        Ok(())
    }

    // --- Stats ---

    /// Entity counts for reporting.
    pub fn stats(&self) -> Result<EventStats, EventsError> {
        let mut stats = EventStats::default();
        for event in self.list_events(None)? {
            match event.status {
                EventStatus::Active => stats.active_events += 1,
                EventStatus::Inactive => stats.inactive_events += 1,
            }
        }
        stats.links = self.storage.count_prefix(CF_EVENT_ARTICLES, b"link:")?;
        stats.labels = self.storage.count_prefix(CF_EVENT_LABELS, b"label:")?;
        stats.analyses = self
            .storage
            .count_prefix(CF_EVENT_ANALYSES, b"analysis:")?;
        Ok(stats)
    }
}

/// Event entity counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventStats {
    pub active_events: u64,
    pub inactive_events: u64,
    pub links: u64,
    pub labels: u64,
    pub analyses: u64,
}
