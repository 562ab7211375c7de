//! Column family definitions for RocksDB.
//!
//! Each column family isolates data with different access patterns:
//! - articles: Normalized articles from every portal (Universal compaction)
//! - events: Event records keyed by ULID
//! - event_articles: Event membership links plus a reverse article index
//! - event_labels: Category and topic-class labels per event
//! - event_analyses: Coverage, keyword and sentiment digest per event
//! - topics: Topic records
//! - topic_events: Topic membership links plus a reverse event index
//! - topic_rels: Parent/child edges plus a reverse child index
//! - checkpoints: Watermarks and job progress

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family name for ingested articles
pub const CF_ARTICLES: &str = "articles";

/// Column family name for event records
pub const CF_EVENTS: &str = "events";

/// Column family name for event-article links
pub const CF_EVENT_ARTICLES: &str = "event_articles";

/// Column family name for event labels
pub const CF_EVENT_LABELS: &str = "event_labels";

/// Column family name for event analyses
pub const CF_EVENT_ANALYSES: &str = "event_analyses";

/// Column family for topic records
pub const CF_TOPICS: &str = "topics";

/// Column family for topic-event links
pub const CF_TOPIC_EVENTS: &str = "topic_events";

/// Column family for topic parent/child relations
pub const CF_TOPIC_RELS: &str = "topic_rels";

/// Column family name for checkpoints
pub const CF_CHECKPOINTS: &str = "checkpoints";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[
    CF_ARTICLES,
    CF_EVENTS,
    CF_EVENT_ARTICLES,
    CF_EVENT_LABELS,
    CF_EVENT_ANALYSES,
    CF_TOPICS,
    CF_TOPIC_EVENTS,
    CF_TOPIC_RELS,
    CF_CHECKPOINTS,
];

/// Create column family options for articles (append-only, compressed)
fn articles_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_ARTICLES, articles_options()),
        ColumnFamilyDescriptor::new(CF_EVENTS, Options::default()),
        ColumnFamilyDescriptor::new(CF_EVENT_ARTICLES, Options::default()),
        ColumnFamilyDescriptor::new(CF_EVENT_LABELS, Options::default()),
        ColumnFamilyDescriptor::new(CF_EVENT_ANALYSES, Options::default()),
        ColumnFamilyDescriptor::new(CF_TOPICS, Options::default()),
        ColumnFamilyDescriptor::new(CF_TOPIC_EVENTS, Options::default()),
        ColumnFamilyDescriptor::new(CF_TOPIC_RELS, Options::default()),
        ColumnFamilyDescriptor::new(CF_CHECKPOINTS, Options::default()),
    ]
}
