//! RocksDB wrapper for news pipeline storage.
//!
//! Provides:
//! - Database open/close with column family setup
//! - Atomic write batches spanning several column families
//! - Single-key, prefix and range reads
//! - Idempotent article writes

use rocksdb::{ColumnFamily, Direction, IteratorMode, Options, WriteBatch, DB};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, instrument};

use news_types::Article;

use crate::column_families::{build_cf_descriptors, ALL_CF_NAMES, CF_ARTICLES, CF_CHECKPOINTS};
use crate::error::StorageError;
use crate::keys::{ArticleKey, CheckpointKey};

/// Main storage interface for the news pipeline
pub struct Storage {
    db: DB,
}

/// A set of writes committed atomically by [`Storage::write`].
///
/// One batch is one unit of work: either every put and delete lands or
/// none of them do.
#[derive(Debug, Default)]
pub struct StorageBatch {
    ops: Vec<BatchOp>,
}

#[derive(Debug)]
enum BatchOp {
    Put {
        cf: &'static str,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        cf: &'static str,
        key: Vec<u8>,
    },
}

impl StorageBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a put.
    pub fn put(&mut self, cf: &'static str, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Put {
            cf,
            key: key.into(),
            value: value.into(),
        });
    }

    /// Queue a delete.
    pub fn delete(&mut self, cf: &'static str, key: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Delete {
            cf,
            key: key.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl Storage {
    /// Open storage at the given path, creating if necessary
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening storage at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        // Articles are append-only; universal compaction suits the workload
        db_opts.set_compaction_style(rocksdb::DBCompactionStyle::Universal);
        db_opts.set_max_background_jobs(4);

        let cf_descriptors = build_cf_descriptors();
        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        Ok(Self { db })
    }

    fn cf(&self, cf_name: &str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(cf_name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(cf_name.to_string()))
    }

    // ==================== Articles ====================

    /// Store an article.
    ///
    /// Returns false if an article with the same `(source_id, article_id)`
    /// already exists; articles are immutable once ingested.
    #[instrument(skip(self, article), fields(article = %article.reference()))]
    pub fn put_article(&self, article: &Article) -> Result<bool, StorageError> {
        let cf = self.cf(CF_ARTICLES)?;
        let index_key = ArticleKey::index_key(&article.source_id, &article.article_id);

        if self.db.get_cf(cf, &index_key)?.is_some() {
            debug!("Article already exists, skipping");
            return Ok(false);
        }

        let key = ArticleKey::new(
            article.published_at.timestamp_millis(),
            &article.source_id,
            &article.article_id,
        );
        let value = serde_json::to_vec(article)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(cf, key.to_bytes(), value);
        batch.put_cf(cf, index_key, key.to_bytes());
        self.db.write(batch)?;

        debug!("Stored article");
        Ok(true)
    }

    /// Get an article by its natural key
    pub fn get_article(
        &self,
        source_id: &str,
        article_id: &str,
    ) -> Result<Option<Article>, StorageError> {
        let cf = self.cf(CF_ARTICLES)?;
        let index_key = ArticleKey::index_key(source_id, article_id);

        let Some(primary) = self.db.get_cf(cf, index_key)? else {
            return Ok(None);
        };
        match self.db.get_cf(cf, primary)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Get articles published in `[start_ms, end_ms)`, ordered by publish time.
    pub fn get_articles_in_range(
        &self,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Article>, StorageError> {
        let start = ArticleKey::prefix_start(start_ms);
        let end = ArticleKey::prefix_end(end_ms);

        self.range_iterator(CF_ARTICLES, &start, &end)?
            .into_iter()
            .map(|(_, value)| serde_json::from_slice(&value).map_err(StorageError::from))
            .collect()
    }

    // ==================== Checkpoints ====================

    /// Store a named checkpoint (watermark or job progress)
    pub fn put_checkpoint(&self, name: &str, checkpoint_bytes: &[u8]) -> Result<(), StorageError> {
        let cf = self.cf(CF_CHECKPOINTS)?;
        let key = CheckpointKey::new(name);
        self.db.put_cf(cf, key.to_bytes(), checkpoint_bytes)?;
        Ok(())
    }

    /// Get a named checkpoint
    pub fn get_checkpoint(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let cf = self.cf(CF_CHECKPOINTS)?;
        let key = CheckpointKey::new(name);
        Ok(self.db.get_cf(cf, key.to_bytes())?)
    }

    // ==================== Generic access ====================

    /// Put a raw key/value into a column family
    pub fn put(&self, cf_name: &str, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let cf = self.cf(cf_name)?;
        self.db.put_cf(cf, key, value)?;
        Ok(())
    }

    /// Get a raw value from a column family
    pub fn get(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let cf = self.cf(cf_name)?;
        Ok(self.db.get_cf(cf, key)?)
    }

    /// Check whether a key exists in a column family
    pub fn contains(&self, cf_name: &str, key: &[u8]) -> Result<bool, StorageError> {
        let cf = self.cf(cf_name)?;
        Ok(self.db.get_pinned_cf(cf, key)?.is_some())
    }

    /// Delete a key from a column family
    pub fn delete(&self, cf_name: &str, key: &[u8]) -> Result<(), StorageError> {
        let cf = self.cf(cf_name)?;
        self.db.delete_cf(cf, key)?;
        Ok(())
    }

    /// Commit a batch atomically.
    pub fn write(&self, batch: StorageBatch) -> Result<(), StorageError> {
        if batch.is_empty() {
            return Ok(());
        }

        let count = batch.len();
        let mut write_batch = WriteBatch::default();
        for op in batch.ops {
            match op {
                BatchOp::Put { cf, key, value } => {
                    write_batch.put_cf(self.cf(cf)?, key, value);
                }
                BatchOp::Delete { cf, key } => {
                    write_batch.delete_cf(self.cf(cf)?, key);
                }
            }
        }

        self.db.write(write_batch)?;
        debug!(ops = count, "Committed batch");
        Ok(())
    }

    /// All entries whose key starts with `prefix`, in key order.
    pub fn prefix_iterator(
        &self,
        cf_name: &str,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let cf = self.cf(cf_name)?;

        let mut results = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));

        for item in iter {
            let (key, value) = item?;
            // Stop if we've passed the prefix
            if !key.starts_with(prefix) {
                break;
            }
            results.push((key.to_vec(), value.to_vec()));
        }

        Ok(results)
    }

    /// All entries with `start <= key < end`, in key order.
    pub fn range_iterator(
        &self,
        cf_name: &str,
        start: &[u8],
        end: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let cf = self.cf(cf_name)?;

        let mut results = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(start, Direction::Forward));

        for item in iter {
            let (key, value) = item?;
            if key.as_ref() >= end {
                break;
            }
            results.push((key.to_vec(), value.to_vec()));
        }

        Ok(results)
    }

    /// Number of keys with the given prefix
    pub fn count_prefix(&self, cf_name: &str, prefix: &[u8]) -> Result<u64, StorageError> {
        let cf = self.cf(cf_name)?;
        let mut count = 0u64;
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    /// Flush all column families to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        for cf_name in ALL_CF_NAMES {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db.flush_cf(cf)?;
            }
        }
        Ok(())
    }

    /// Trigger manual compaction on all column families
    pub fn compact(&self) -> Result<(), StorageError> {
        for cf_name in ALL_CF_NAMES {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db.compact_range_cf(cf, None::<&[u8]>, None::<&[u8]>);
            }
        }
        info!("Compaction complete");
        Ok(())
    }

    /// Get raw storage statistics
    pub fn get_stats(&self) -> Result<StorageStats, StorageError> {
        let mut stats = StorageStats {
            article_count: self.count_prefix(CF_ARTICLES, b"art:")?,
            ..Default::default()
        };

        for cf_name in ALL_CF_NAMES {
            let cf = self.cf(cf_name)?;
            let mut count = 0u64;
            for item in self.db.iterator_cf(cf, IteratorMode::Start) {
                item?;
                count += 1;
            }
            stats.cf_entries.push((cf_name.to_string(), count));
        }

        stats.disk_usage_bytes = self.get_disk_usage();
        Ok(stats)
    }

    fn get_disk_usage(&self) -> u64 {
        let mut total_size = 0u64;
        if let Ok(entries) = std::fs::read_dir(self.db.path()) {
            for entry in entries.flatten() {
                if let Ok(metadata) = entry.metadata() {
                    total_size += metadata.len();
                }
            }
        }
        total_size
    }
}

/// Storage statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct StorageStats {
    /// Number of ingested articles
    pub article_count: u64,
    /// Raw entry count per column family, indexes included
    pub cf_entries: Vec<(String, u64)>,
    /// Total disk usage in bytes
    pub disk_usage_bytes: u64,
}
