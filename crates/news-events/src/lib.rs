//! # news-events
//!
//! Event detection for the news pipeline.
//!
//! ## Stages
//! - [`grouper`]: windows recent articles and groups them by similarity
//! - [`lifecycle`]: creates or merges events from candidate groups and
//!   closes stale ones
//! - [`labeling`]: attaches category and topic-class labels to events
//! - [`analysis`]: digests each event's coverage into keywords, sentiment,
//!   a timeline and quotes
//!
//! Each stage is invocable on its own and returns a
//! [`RunSummary`](news_types::RunSummary); per-item failures are recorded,
//! never thrown.

pub mod analysis;
pub mod config;
pub mod error;
pub mod grouper;
pub mod labeling;
pub mod lifecycle;
pub mod source;
pub mod storage;
pub mod taxonomy;

pub use analysis::{
    EventAnalysis, EventAnalyzer, Sentiment, SentimentTally, TimelineEntry, ANALYSIS_CHECKPOINT,
};
pub use config::{EventsConfig, GroupingConfig, LabelingConfig, LifecycleConfig};
pub use error::EventsError;
pub use grouper::{CandidateGroup, CandidateGroups, GroupMember, GroupingReport, SimilarityGrouper};
pub use labeling::{EventLabeler, LABELING_CHECKPOINT};
pub use lifecycle::{EventLifecycle, MergeDecision, DETECTION_WATERMARK};
pub use source::{ArticleSource, MemorySource, StoredArticles, UnionSource};
pub use storage::{EventStats, EventStorage, Watermark};
pub use taxonomy::{default_categories, default_taxonomy, TopicClass};
