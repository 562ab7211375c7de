//! Storage layer for the news event pipeline.
//!
//! Provides RocksDB-backed storage with:
//! - Column family isolation per entity (articles, events, labels, topics, ...)
//! - Time-prefixed article keys for range scans by publish time
//! - Atomic multi-key writes via [`StorageBatch`]
//! - Idempotent article ingestion
//! - Named checkpoints for watermarks and job progress
//!
//! Entity-specific key layouts for events and topics live with the crates
//! that own those entities; this crate only knows about articles and
//! checkpoints.

pub mod column_families;
pub mod db;
pub mod error;
pub mod keys;

pub use db::{Storage, StorageBatch, StorageStats};
pub use error::StorageError;
pub use keys::{ArticleKey, CheckpointKey};
