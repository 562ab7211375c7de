//! # news-types
//!
//! Shared domain records for the news event pipeline.
//!
//! - Articles: normalized, read-only records handed over by portal adapters
//! - Events: one real-world occurrence corroborated by similar articles
//! - Labels: weighted category and topic-class labels on events
//! - Topics: longer-horizon groupings of events, with parent/child edges
//! - Run summaries: per-run counters plus per-item failures

pub mod article;
pub mod error;
pub mod event;
pub mod summary;
pub mod topic;

pub use article::{Article, ArticleRef};
pub use error::NewsError;
pub use event::{Event, EventArticleLink, EventId, EventLabel, EventStatus, LabelKind};
pub use summary::{ItemError, ItemErrorKind, RunSummary};
pub use topic::{Topic, TopicEventLink, TopicId, TopicRelation};
