//! Article records.
//!
//! Articles are produced by per-portal adapters and are immutable once
//! ingested. The pipeline only ever reads them through a union view.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::NewsError;

/// A normalized news article from any portal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    /// Identifier assigned by the source portal
    pub article_id: String,
    /// Portal the article came from (e.g. "bbc", "guardian")
    pub source_id: String,
    /// Headline
    pub title: String,
    /// Standfirst / summary paragraph
    #[serde(default)]
    pub description: Option<String>,
    /// Publication timestamp
    pub published_at: DateTime<Utc>,
    /// Portal-specific category identifier
    #[serde(default)]
    pub category_id: Option<String>,
}

impl Article {
    /// Create an article with no description or category.
    pub fn new(
        article_id: impl Into<String>,
        source_id: impl Into<String>,
        title: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            article_id: article_id.into(),
            source_id: source_id.into(),
            title: title.into(),
            description: None,
            published_at,
            category_id: None,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the portal category.
    pub fn with_category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    /// Reference used in links and run summaries.
    pub fn reference(&self) -> ArticleRef {
        ArticleRef::new(&self.source_id, &self.article_id)
    }

    /// Text used for grouping: `title + " " + description`.
    pub fn embedding_text(&self) -> String {
        match self.description.as_deref().map(str::trim) {
            Some(desc) if !desc.is_empty() => format!("{} {}", self.title.trim(), desc),
            _ => self.title.trim().to_string(),
        }
    }

    /// Check that the record can take part in grouping.
    ///
    /// A blank title or blank identifiers exclude the article. A missing
    /// description is tolerated and treated as empty text.
    pub fn validate(&self) -> Result<(), NewsError> {
        if self.article_id.trim().is_empty() {
            return Err(NewsError::InvalidInput("article_id is empty".to_string()));
        }
        if self.source_id.trim().is_empty() {
            return Err(NewsError::InvalidInput(format!(
                "article {} has no source_id",
                self.article_id
            )));
        }
        if self.title.trim().is_empty() {
            return Err(NewsError::InvalidInput(format!(
                "article {}:{} has no title",
                self.source_id, self.article_id
            )));
        }
        Ok(())
    }

    /// Stable ordering used everywhere articles are sequenced:
    /// publish time, then source, then id.
    pub fn order_key(&self) -> (DateTime<Utc>, &str, &str) {
        (self.published_at, &self.source_id, &self.article_id)
    }
}

/// `(source_id, article_id)` pair identifying an article across portals.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArticleRef {
    pub source_id: String,
    pub article_id: String,
}

impl ArticleRef {
    pub fn new(source_id: impl Into<String>, article_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            article_id: article_id.into(),
        }
    }
}

impl fmt::Display for ArticleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source_id, self.article_id)
    }
}
