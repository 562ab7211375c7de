//! Similarity grouper.
//!
//! Partitions a time-ordered article batch into windows and greedily groups
//! articles within each window by embedding similarity.
//!
//! ## Algorithm
//! 1. Articles are sorted by `(published_at, source_id, article_id)`.
//! 2. A window starts at the first unprocessed article and takes every
//!    following article published within `window_hours` of that start.
//!    The next window starts at the first article left out.
//! 3. Each article in the window is embedded once (`title + " " + description`).
//! 4. In window order, each unconsumed article seeds a group with every other
//!    unconsumed article whose similarity to the seed meets the threshold.
//!    A seed with no such neighbor produces no group and stays unconsumed.
//!
//! Each article is compared once per run: articles still unconsumed when
//! their window closes are reported as ungrouped and are not carried into
//! the next window. The lifecycle manager hands ungrouped articles back to
//! the next run while they remain inside the lookback.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use news_embeddings::{Embedding, EmbeddingModel};
use news_types::{Article, ArticleRef, ItemError, ItemErrorKind};
use tracing::{debug, warn};

use crate::config::GroupingConfig;
use crate::error::EventsError;

/// Similarity of the seed to itself, recorded on its link row.
pub const SEED_SIMILARITY: f32 = 1.0;

/// An article admitted to a group, with its similarity to the seed.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupMember {
    pub article: Article,
    pub similarity: f32,
}

/// Articles believed to describe one occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateGroup {
    /// Window the group was formed in (0-based, in run order)
    pub window: usize,
    /// The article that seeded the group
    pub seed: Article,
    /// Other members in window order; never empty
    pub members: Vec<GroupMember>,
}

impl CandidateGroup {
    /// Number of articles including the seed.
    pub fn len(&self) -> usize {
        self.members.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Earliest publish time in the group.
    pub fn start_time(&self) -> DateTime<Utc> {
        self.members
            .iter()
            .map(|m| m.article.published_at)
            .fold(self.seed.published_at, |a, b| a.min(b))
    }

    /// Mean seed-to-member similarity.
    pub fn confidence(&self) -> f32 {
        if self.members.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.members.iter().map(|m| m.similarity).sum();
        (sum / self.members.len() as f32).clamp(0.0, 1.0)
    }

    /// Every article with the similarity that justified its membership,
    /// seed first.
    pub fn scored_articles(&self) -> impl Iterator<Item = (&Article, f32)> {
        std::iter::once((&self.seed, SEED_SIMILARITY))
            .chain(self.members.iter().map(|m| (&m.article, m.similarity)))
    }

    /// References of every article in the group, seed first.
    pub fn references(&self) -> Vec<ArticleRef> {
        self.scored_articles().map(|(a, _)| a.reference()).collect()
    }
}

/// What happened to articles that did not end up in a group.
#[derive(Debug, Clone, Default)]
pub struct GroupingReport {
    /// Valid, de-duplicated articles considered
    pub articles_seen: usize,
    /// Windows processed so far
    pub windows: usize,
    /// Data-quality exclusions and embedding failures
    pub errors: Vec<ItemError>,
    /// Embedded articles with no similar neighbor in their window
    pub ungrouped: Vec<ArticleRef>,
    /// Articles processed so far, in order; the last one is the watermark
    pub last_processed: Option<Article>,
}

/// Groups articles by embedding similarity within time windows.
pub struct SimilarityGrouper {
    model: Arc<dyn EmbeddingModel>,
    config: GroupingConfig,
}

impl SimilarityGrouper {
    /// Create a grouper. Fails on invalid configuration.
    pub fn new(model: Arc<dyn EmbeddingModel>, config: GroupingConfig) -> Result<Self, EventsError> {
        config.validate()?;
        Ok(Self { model, config })
    }

    pub fn config(&self) -> &GroupingConfig {
        &self.config
    }

    /// Lazily group `articles`.
    ///
    /// Input order does not matter; articles are re-sorted into a stable
    /// order first. Invalid articles and duplicates are excluded up front.
    pub fn group(&self, articles: Vec<Article>) -> CandidateGroups<'_> {
        let mut report = GroupingReport::default();
        let mut seen = HashSet::new();

        let mut valid: Vec<Article> = articles
            .into_iter()
            .filter(|article| match article.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!(article = %article.reference(), error = %e, "Excluding article");
                    report.errors.push(ItemError::new(
                        article.reference().to_string(),
                        ItemErrorKind::DataQuality,
                        e.to_string(),
                    ));
                    false
                }
            })
            .collect();

        valid.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        valid.retain(|a| seen.insert(a.reference()));
        report.articles_seen = valid.len();

        CandidateGroups {
            grouper: self,
            articles: valid,
            cursor: 0,
            pending: VecDeque::new(),
            report,
        }
    }

    fn window_end(&self, articles: &[Article], start: usize) -> usize {
        let window_start = articles[start].published_at;
        let width = self.config.window();
        articles[start..]
            .iter()
            .position(|a| a.published_at - window_start > width)
            .map(|offset| start + offset)
            .unwrap_or(articles.len())
    }

    fn group_window(
        &self,
        window_index: usize,
        window: &[Article],
        report: &mut GroupingReport,
    ) -> Vec<CandidateGroup> {
        let texts: Vec<String> = window.iter().map(Article::embedding_text).collect();
        let embeddings: Vec<Option<Embedding>> = self
            .model
            .embed_each(&texts)
            .into_iter()
            .zip(window)
            .map(|(result, article)| match result {
                Ok(embedding) => Some(embedding),
                Err(e) => {
                    warn!(article = %article.reference(), error = %e, "Embedding failed, skipping article");
                    report.errors.push(ItemError::new(
                        article.reference().to_string(),
                        ItemErrorKind::Embedding,
                        e.to_string(),
                    ));
                    None
                }
            })
            .collect();

        let threshold = self.config.similarity_threshold;
        let mut consumed = vec![false; window.len()];
        let mut groups = Vec::new();

        for seed in 0..window.len() {
            if consumed[seed] {
                continue;
            }
            let Some(seed_embedding) = &embeddings[seed] else {
                continue;
            };

            let members: Vec<(usize, f32)> = (0..window.len())
                .filter(|&j| j != seed && !consumed[j])
                .filter_map(|j| {
                    let similarity = seed_embedding.cosine_similarity(embeddings[j].as_ref()?);
                    (similarity >= threshold).then_some((j, similarity))
                })
                .collect();

            if members.is_empty() {
                continue;
            }

            consumed[seed] = true;
            for &(j, _) in &members {
                consumed[j] = true;
            }

            groups.push(CandidateGroup {
                window: window_index,
                seed: window[seed].clone(),
                members: members
                    .into_iter()
                    .map(|(j, similarity)| GroupMember {
                        article: window[j].clone(),
                        similarity,
                    })
                    .collect(),
            });
        }

        for (i, article) in window.iter().enumerate() {
            if !consumed[i] && embeddings[i].is_some() {
                debug!(article = %article.reference(), "No similar article in window");
                report.ungrouped.push(article.reference());
            }
        }

        debug!(
            window = window_index,
            articles = window.len(),
            groups = groups.len(),
            "Window grouped"
        );
        groups
    }
}

/// Lazy sequence of candidate groups, one window at a time.
pub struct CandidateGroups<'a> {
    grouper: &'a SimilarityGrouper,
    articles: Vec<Article>,
    cursor: usize,
    pending: VecDeque<CandidateGroup>,
    report: GroupingReport,
}

impl CandidateGroups<'_> {
    /// Report for the windows processed so far.
    pub fn report(&self) -> &GroupingReport {
        &self.report
    }

    /// Consume the iterator, returning the report.
    pub fn into_report(self) -> GroupingReport {
        self.report
    }

    /// True when every window has been processed and every group yielded.
    pub fn is_exhausted(&self) -> bool {
        self.pending.is_empty() && self.cursor >= self.articles.len()
    }
}

impl Iterator for CandidateGroups<'_> {
    type Item = CandidateGroup;

    fn next(&mut self) -> Option<CandidateGroup> {
        loop {
            if let Some(group) = self.pending.pop_front() {
                return Some(group);
            }
            if self.cursor >= self.articles.len() {
                return None;
            }

            let start = self.cursor;
            let end = self.grouper.window_end(&self.articles, start);
            let window_index = self.report.windows;

            let groups =
                self.grouper
                    .group_window(window_index, &self.articles[start..end], &mut self.report);

            self.report.windows += 1;
            self.report.last_processed = Some(self.articles[end - 1].clone());
            self.cursor = end;
            self.pending.extend(groups);
        }
    }
}
