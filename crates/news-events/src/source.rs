//! Article sources.
//!
//! Each portal is read through an [`ArticleSource`] adapter that yields
//! articles in the common [`Article`] shape. [`UnionSource`] merges several
//! adapters into the single ordered view the grouper consumes.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use news_storage::Storage;
use news_types::Article;
use tracing::{debug, warn};

use crate::error::EventsError;

/// A read-only query over normalized articles.
pub trait ArticleSource: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Articles published in `[start, end)`.
    fn articles_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Article>, EventsError>;
}

/// Articles persisted in the `articles` column family.
///
/// Optionally restricted to one portal, which makes it usable as a
/// per-source adapter.
pub struct StoredArticles {
    storage: Arc<Storage>,
    source_id: Option<String>,
    name: String,
}

impl StoredArticles {
    /// All stored articles regardless of portal.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            source_id: None,
            name: "stored".to_string(),
        }
    }

    /// Stored articles from a single portal.
    pub fn for_source(storage: Arc<Storage>, source_id: impl Into<String>) -> Self {
        let source_id = source_id.into();
        Self {
            storage,
            name: format!("stored:{}", source_id),
            source_id: Some(source_id),
        }
    }
}

impl ArticleSource for StoredArticles {
    fn name(&self) -> &str {
        &self.name
    }

    fn articles_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Article>, EventsError> {
        let mut articles = self
            .storage
            .get_articles_in_range(start.timestamp_millis(), end.timestamp_millis())?;
        if let Some(source_id) = &self.source_id {
            articles.retain(|a| &a.source_id == source_id);
        }
        Ok(articles)
    }
}

/// In-memory articles, for replays and fixtures.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    name: String,
    articles: Vec<Article>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, articles: Vec<Article>) -> Self {
        Self {
            name: name.into(),
            articles,
        }
    }
}

impl ArticleSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn articles_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Article>, EventsError> {
        Ok(self
            .articles
            .iter()
            .filter(|a| a.published_at >= start && a.published_at < end)
            .cloned()
            .collect())
    }
}

/// Union view over several sources.
///
/// Results are ordered by `(published_at, source_id, article_id)` and
/// de-duplicated on `(source_id, article_id)`; the first adapter wins.
#[derive(Default)]
pub struct UnionSource {
    sources: Vec<Box<dyn ArticleSource>>,
}

impl UnionSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an adapter.
    pub fn with_source(mut self, source: impl ArticleSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl ArticleSource for UnionSource {
    fn name(&self) -> &str {
        "union"
    }

    fn articles_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Article>, EventsError> {
        let mut seen = HashSet::new();
        let mut merged = Vec::new();

        for source in &self.sources {
            let batch = source.articles_between(start, end)?;
            debug!(source = source.name(), count = batch.len(), "Read articles");
            for article in batch {
                if seen.insert(article.reference()) {
                    merged.push(article);
                } else {
                    warn!(
                        source = source.name(),
                        article = %article.reference(),
                        "Duplicate article across sources, keeping first"
                    );
                }
            }
        }

        merged.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_memory_source_half_open_range() {
        let source = MemorySource::new(
            "fixture",
            vec![
                Article::new("1", "bbc", "A", at(8)),
                Article::new("2", "bbc", "B", at(10)),
            ],
        );
        let found = source.articles_between(at(8), at(10)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].article_id, "1");
    }

    #[test]
    fn test_union_orders_and_dedups() {
        let bbc = MemorySource::new(
            "bbc",
            vec![
                Article::new("1", "bbc", "Later", at(11)),
                Article::new("2", "bbc", "Same time", at(9)),
            ],
        );
        let cnn = MemorySource::new(
            "cnn",
            vec![
                Article::new("9", "cnn", "Same time", at(9)),
                Article::new("1", "bbc", "Duplicate", at(11)),
            ],
        );
        let union = UnionSource::new().with_source(bbc).with_source(cnn);

        let found = union.articles_between(at(0), at(23)).unwrap();
        let refs: Vec<String> = found.iter().map(|a| a.reference().to_string()).collect();
        assert_eq!(refs, vec!["bbc:2", "cnn:9", "bbc:1"]);
        assert_eq!(found[2].title, "Later");
    }

    #[test]
    fn test_stored_articles_per_source() {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());
        storage.put_article(&Article::new("1", "bbc", "A", at(9))).unwrap();
        storage.put_article(&Article::new("2", "nyt", "B", at(9))).unwrap();

        let all = StoredArticles::new(storage.clone());
        let bbc = StoredArticles::for_source(storage, "bbc");
        let end = at(9) + Duration::hours(1);

        assert_eq!(all.articles_between(at(0), end).unwrap().len(), 2);
        let only_bbc = bbc.articles_between(at(0), end).unwrap();
        assert_eq!(only_bbc.len(), 1);
        assert_eq!(only_bbc[0].source_id, "bbc");
        assert_eq!(bbc.name(), "stored:bbc");
    }
}
