//! JSON Lines article ingestion.
//!
//! Each non-blank line is one normalized [`Article`]. Malformed or invalid
//! lines are skipped and counted; already-ingested articles are left as
//! they are.

use std::io::BufRead;

use anyhow::{Context, Result};
use news_storage::Storage;
use news_types::Article;
use serde::Serialize;
use tracing::{info, warn};

/// Outcome of an import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub lines: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub invalid: usize,
}

/// Ingest articles from a JSON Lines reader.
pub fn import_articles<R: BufRead>(storage: &Storage, reader: R) -> Result<ImportReport> {
    let mut report = ImportReport::default();

    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", index + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        report.lines += 1;

        let article: Article = match serde_json::from_str(&line) {
            Ok(article) => article,
            Err(e) => {
                warn!(line = index + 1, error = %e, "Skipping malformed article");
                report.invalid += 1;
                continue;
            }
        };
        if let Err(e) = article.validate() {
            warn!(line = index + 1, article = %article.reference(), error = %e, "Skipping invalid article");
            report.invalid += 1;
            continue;
        }

        if storage
            .put_article(&article)
            .context("Failed to store article")?
        {
            report.inserted += 1;
        } else {
            report.duplicates += 1;
        }
    }

    info!(
        inserted = report.inserted,
        duplicates = report.duplicates,
        invalid = report.invalid,
        "Import complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_import_counts_each_outcome() {
        let temp = TempDir::new().unwrap();
        let storage = Storage::open(temp.path()).unwrap();
        let input = r#"{"article_id":"1","source_id":"bbc","title":"Central Bank Raises Rates","published_at":"2024-03-01T09:00:00Z"}

{"article_id":"1","source_id":"bbc","title":"Central Bank Raises Rates","published_at":"2024-03-01T09:00:00Z"}
not json
{"article_id":"2","source_id":"bbc","title":"   ","published_at":"2024-03-01T09:10:00Z"}
{"article_id":"3","source_id":"nyt","title":"Local Bakery Opens","description":"Fresh bread","published_at":"2024-03-01T09:20:00Z"}
"#;

        let report = import_articles(&storage, input.as_bytes()).unwrap();
        assert_eq!(
            report,
            ImportReport {
                lines: 5,
                inserted: 2,
                duplicates: 1,
                invalid: 2,
            }
        );

        let bakery = storage.get_article("nyt", "3").unwrap().unwrap();
        assert_eq!(bakery.description.as_deref(), Some("Fresh bread"));
    }
}
