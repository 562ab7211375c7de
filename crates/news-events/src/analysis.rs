//! Event analysis.
//!
//! Digests the articles linked to an event into:
//! - portal coverage: linked articles per source
//! - common keywords: the terms shared by the most articles
//! - a sentiment tally from fixed positive and negative word lists
//! - a timeline of the linked articles in publication order
//! - key quotes lifted from article descriptions
//!
//! Each event keeps one analysis, replaced whenever it is recomputed.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use news_types::{Article, EventId, ItemError, RunSummary};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::EventsError;
use crate::storage::EventStorage;

/// Checkpoint name for the last analysis pass.
pub const ANALYSIS_CHECKPOINT: &str = "event_analysis";

/// Keywords kept per analysis.
pub const TOP_KEYWORDS: usize = 10;

/// Quotes kept per analysis.
pub const MAX_QUOTES: usize = 5;

/// A quote must be longer than this many characters.
const MIN_QUOTE_CHARS: usize = 10;

const POSITIVE_WORDS: &[&str] = &["success", "breakthrough", "agreement", "victory", "progress"];
const NEGATIVE_WORDS: &[&str] = &["crisis", "conflict", "failure", "disaster", "threat"];

const STOPWORDS: &[&str] = &[
    "about", "after", "again", "against", "all", "also", "and", "are", "before", "but", "can",
    "could", "did", "does", "for", "from", "had", "has", "have", "her", "his", "how", "into",
    "its", "more", "most", "new", "not", "now", "off", "one", "only", "our", "out", "over",
    "said", "she", "should", "than", "that", "the", "their", "them", "then", "there", "these",
    "they", "this", "those", "through", "under", "was", "were", "what", "when", "where", "which",
    "while", "who", "why", "will", "with", "would", "you", "your",
];

/// Tone of one article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

/// Articles per sentiment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentTally {
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
}

impl SentimentTally {
    fn record(&mut self, sentiment: Sentiment) {
        match sentiment {
            Sentiment::Positive => self.positive += 1,
            Sentiment::Negative => self.negative += 1,
            Sentiment::Neutral => self.neutral += 1,
        }
    }
}

/// One linked article on the event timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub published_at: DateTime<Utc>,
    pub source_id: String,
    pub article_id: String,
    pub title: String,
}

/// Digest of the coverage of one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAnalysis {
    pub event_id: EventId,
    /// Linked articles found in storage
    pub total_articles: usize,
    /// Articles per source, keyed by source id
    pub portal_coverage: BTreeMap<String, usize>,
    /// Most widespread terms, most articles first
    pub common_keywords: Vec<String>,
    pub sentiment: SentimentTally,
    /// Articles ordered by publish time, then source, then id
    pub timeline: Vec<TimelineEntry>,
    /// Distinct quotes in timeline order
    pub key_quotes: Vec<String>,
    pub analyzed_at: DateTime<Utc>,
}

/// Lowercased alphanumeric runs.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn is_keyword(token: &str) -> bool {
    token.chars().count() >= 3
        && !token.chars().all(|c| c.is_ascii_digit())
        && !STOPWORDS.contains(&token)
}

fn word_hits(words: &[&str], tokens: &[String]) -> usize {
    words
        .iter()
        .filter(|w| tokens.iter().any(|t| t.starts_with(**w)))
        .count()
}

/// Classify a token list by which word list it hits more often.
///
/// A word counts once per article and also matches its inflections
/// ("threatens" hits "threat").
pub fn classify_sentiment(tokens: &[String]) -> Sentiment {
    let positive = word_hits(POSITIVE_WORDS, tokens);
    let negative = word_hits(NEGATIVE_WORDS, tokens);
    if positive > negative {
        Sentiment::Positive
    } else if negative > positive {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    }
}

/// The first quoted passage in `text`, straight or curly quotes.
///
/// Returns `None` when there is no closed quote or it is too short to be
/// worth keeping.
pub fn first_quote(text: &str) -> Option<&str> {
    let (start, open) = text
        .char_indices()
        .find(|(_, c)| *c == '"' || *c == '\u{201C}')?;
    let close = if open == '"' { '"' } else { '\u{201D}' };
    let body = start + open.len_utf8();
    let end = body + text[body..].find(close)?;
    let quote = text[body..end].trim();
    (quote.chars().count() > MIN_QUOTE_CHARS).then_some(quote)
}

/// Terms appearing in the most articles. Ties go to the alphabetically
/// first term.
pub fn common_keywords<'a>(articles: impl IntoIterator<Item = &'a Article>) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for article in articles {
        let distinct: BTreeSet<String> = tokenize(&article.embedding_text())
            .into_iter()
            .filter(|t| is_keyword(t))
            .collect();
        for token in distinct {
            *counts.entry(token).or_default() += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
        .into_iter()
        .take(TOP_KEYWORDS)
        .map(|(term, _)| term)
        .collect()
}

/// Build the analysis of an event from its linked articles.
pub fn analyze_articles(event_id: &str, articles: &[Article], now: DateTime<Utc>) -> EventAnalysis {
    let mut ordered: Vec<&Article> = articles.iter().collect();
    ordered.sort_by(|a, b| a.order_key().cmp(&b.order_key()));

    let mut portal_coverage = BTreeMap::new();
    let mut sentiment = SentimentTally::default();
    let mut key_quotes: Vec<String> = Vec::new();
    let mut timeline = Vec::with_capacity(ordered.len());

    for article in &ordered {
        *portal_coverage.entry(article.source_id.clone()).or_insert(0) += 1;
        sentiment.record(classify_sentiment(&tokenize(&article.embedding_text())));

        if let Some(quote) = article.description.as_deref().and_then(first_quote) {
            if key_quotes.len() < MAX_QUOTES && !key_quotes.iter().any(|q| q == quote) {
                key_quotes.push(quote.to_string());
            }
        }

        timeline.push(TimelineEntry {
            published_at: article.published_at,
            source_id: article.source_id.clone(),
            article_id: article.article_id.clone(),
            title: article.title.clone(),
        });
    }

    EventAnalysis {
        event_id: event_id.to_string(),
        total_articles: ordered.len(),
        portal_coverage,
        common_keywords: common_keywords(ordered.iter().copied()),
        sentiment,
        timeline,
        key_quotes,
        analyzed_at: now,
    }
}

/// Computes and stores event analyses.
pub struct EventAnalyzer {
    store: Arc<EventStorage>,
}

impl EventAnalyzer {
    pub fn new(store: Arc<EventStorage>) -> Self {
        Self { store }
    }

    /// Articles linked to an event. Links to articles missing from storage
    /// are skipped.
    pub fn event_articles(&self, event_id: &str) -> Result<Vec<Article>, EventsError> {
        let storage = self.store.storage();
        let mut articles = Vec::new();
        for link in self.store.links_for_event(event_id)? {
            match storage.get_article(&link.source_id, &link.article_id)? {
                Some(article) => articles.push(article),
                None => debug!(
                    event_id,
                    source_id = %link.source_id,
                    article_id = %link.article_id,
                    "Linked article missing"
                ),
            }
        }
        Ok(articles)
    }

    /// Compute an event's analysis without storing it.
    pub fn compute(&self, event_id: &str, now: DateTime<Utc>) -> Result<EventAnalysis, EventsError> {
        self.store.require_event(event_id)?;
        let articles = self.event_articles(event_id)?;
        if articles.is_empty() {
            return Err(EventsError::Source(format!(
                "event {} has no readable articles",
                event_id
            )));
        }
        Ok(analyze_articles(event_id, &articles, now))
    }

    /// Analyze one event, replacing its previous analysis.
    #[instrument(skip(self))]
    pub fn analyze_event(&self, event_id: &str, now: DateTime<Utc>) -> RunSummary {
        let mut summary = RunSummary::begin("analyze_event", now);
        self.analyze_one(event_id, now, &mut summary);
        summary.finish(now)
    }

    fn analyze_one(&self, event_id: &str, now: DateTime<Utc>, summary: &mut RunSummary) {
        let result = self.compute(event_id, now).and_then(|analysis| {
            self.store.put_analysis(&analysis)?;
            Ok(analysis.total_articles)
        });

        match result {
            Ok(articles) => {
                debug!(event_id, articles, "Analyzed event");
                summary.events_analyzed += 1;
            }
            Err(e) => {
                warn!(event_id, error = %e, "Analysis failed");
                summary.record_error(ItemError::new(event_id, e.item_kind(), e.to_string()));
            }
        }
    }

    /// Analyze every event updated strictly after `since`.
    pub fn analyze_since(
        &self,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, EventsError> {
        let mut summary = RunSummary::begin("analyze_since", now);
        for event in self.store.events_updated_since(since)? {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            self.analyze_one(&event.event_id, now, &mut summary);
        }
        Ok(summary.finish(now))
    }

    /// Analyze events changed since the last completed pass, then advance
    /// the checkpoint. A cancelled pass leaves the checkpoint unchanged.
    #[instrument(skip(self, cancel))]
    pub fn analyze_pending(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, EventsError> {
        let since = self
            .store
            .get_time_checkpoint(ANALYSIS_CHECKPOINT)?
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut summary = self.analyze_since(since, now, cancel)?;
        summary.operation = "analyze_pending".to_string();

        if !summary.cancelled {
            self.store.put_time_checkpoint(ANALYSIS_CHECKPOINT, now)?;
        }

        info!(
            analyzed = summary.events_analyzed,
            errors = summary.errors.len(),
            "Analysis pass complete"
        );
        Ok(summary)
    }
}
