//! Pipeline jobs.
//!
//! - **event_detection**: detect and merge events from new articles, then
//!   sweep stale events
//! - **event_labeling**: label events changed since the last pass
//! - **event_analysis**: re-analyze events changed since the last pass
//! - **topic_detection**: cluster events into topics, then classify the
//!   topics that run created
//!
//! The engines are synchronous; each run executes on the blocking pool and
//! observes the run's cancellation token between units of work.

pub mod event_analysis;
pub mod event_detection;
pub mod event_labeling;
pub mod topic_detection;

pub use event_analysis::create_event_analysis_job;
pub use event_detection::create_event_detection_job;
pub use event_labeling::create_event_labeling_job;
pub use topic_detection::create_topic_detection_job;

use crate::registry::JobOutput;

/// Run blocking pipeline work off the async runtime.
pub(crate) async fn run_blocking<F>(job: &'static str, work: F) -> Result<JobOutput, String>
where
    F: FnOnce() -> Result<news_types::RunSummary, String> + Send + 'static,
{
    let summary = tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| format!("{} worker panicked: {}", job, e))??;

    for item in &summary.errors {
        tracing::warn!(job, item = %item.item, kind = %item.kind, error = %item.message, "Item skipped");
    }
    Ok(JobOutput::from(&summary))
}
