//! Text profiles used to embed events and topics.

use std::collections::BTreeSet;

use news_events::EventStorage;
use news_types::{Event, Topic};

use crate::error::TopicsError;
use crate::storage::TopicStorage;

/// Event title and description followed by its category and class labels.
pub fn event_profile(events: &EventStorage, event: &Event) -> Result<String, TopicsError> {
    let labels: BTreeSet<String> = events
        .labels_for_event(&event.event_id)?
        .into_iter()
        .map(|l| l.label)
        .collect();

    let mut parts = vec![event.text()];
    parts.extend(labels);
    Ok(parts.join(" "))
}

/// Topic name and description followed by member event titles and the
/// union of member labels.
///
/// Members that no longer exist are skipped.
pub fn topic_profile(
    events: &EventStorage,
    topics: &TopicStorage,
    topic: &Topic,
) -> Result<String, TopicsError> {
    let mut parts = vec![topic.name.clone(), topic.description.clone()];
    let mut labels = BTreeSet::new();

    for event_id in topics.events_for_topic(&topic.topic_id)? {
        let Some(event) = events.get_event(&event_id)? else {
            continue;
        };
        parts.push(event.title);
        labels.extend(
            events
                .labels_for_event(&event_id)?
                .into_iter()
                .map(|l| l.label),
        );
    }

    parts.extend(labels);
    Ok(parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use news_storage::Storage;
    use news_types::{EventLabel, LabelKind};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_profiles_include_labels_once() {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());
        let events = EventStorage::new(storage.clone());
        let topics = TopicStorage::new(storage);
        let now = Utc::now();

        let event = Event::new("E1", "Rates rise", Some("Again".to_string()), now, 0.9, now);
        events.create_event(&event, &[]).unwrap();
        events
            .upsert_labels(&[
                EventLabel::new("E1", LabelKind::Category, "business", 0.8, now),
                EventLabel::new("E1", LabelKind::TopicClass, "business", 0.75, now),
            ])
            .unwrap();

        assert_eq!(
            event_profile(&events, &event).unwrap(),
            "Rates rise Again business"
        );

        let topic = Topic::new("T1", "Rates rise", "Topic covering 1 related events", 0.9, now);
        topics
            .create_topic(&topic, &["E1".to_string(), "E-gone".to_string()])
            .unwrap();
        assert_eq!(
            topic_profile(&events, &topics, &topic).unwrap(),
            "Rates rise Topic covering 1 related events Rates rise business"
        );
    }
}
