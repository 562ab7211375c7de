//! # news-topics
//!
//! Longer-horizon topics built from clusters of events.
//!
//! ## Stages
//! - [`aggregator`]: clusters recent, well-corroborated events with DBSCAN
//!   and synthesizes one topic per cluster
//! - [`hierarchy`]: links older topics to younger similar ones as
//!   parent -> child edges, forming a DAG
//!
//! Both stages return a [`RunSummary`](news_types::RunSummary) and record
//! per-item failures instead of aborting.

pub mod aggregator;
pub mod clustering;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod profile;
pub mod storage;

pub use aggregator::{common_labels, synthesize_topic, TopicAggregator, TopicDetection, TOP_LABELS};
pub use clustering::{dbscan, pairwise_distances, Clustering};
pub use config::{DetectionConfig, HierarchyConfig, TopicsConfig};
pub use error::TopicsError;
pub use hierarchy::TopicHierarchy;
pub use storage::{member_fingerprint, TopicStats, TopicStorage};
