//! Job registry for tracking job metadata and execution status.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of a job execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobResult {
    /// Job completed (per-item failures may still be listed in metadata)
    Success,
    /// Job failed with an error message
    Failed(String),
    /// Job was skipped (overlap, pause)
    Skipped(String),
}

/// Job output carrying counters back to the registry.
#[derive(Debug, Clone, Default)]
pub struct JobOutput {
    pub metadata: HashMap<String, String>,
}

impl JobOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }
}

#[cfg(feature = "jobs")]
impl From<&news_types::RunSummary> for JobOutput {
    fn from(summary: &news_types::RunSummary) -> Self {
        let mut output = JobOutput::new().with_metadata("operation", &summary.operation);
        for (key, value) in [
            ("articles_seen", summary.articles_seen),
            ("candidate_groups", summary.candidate_groups),
            ("events_created", summary.events_created),
            ("events_merged", summary.events_merged),
            ("events_deactivated", summary.events_deactivated),
            ("events_labeled", summary.events_labeled),
            ("labels_written", summary.labels_written),
            ("labels_removed", summary.labels_removed),
            ("events_analyzed", summary.events_analyzed),
            ("topics_created", summary.topics_created),
            ("topics_existing", summary.topics_existing),
            ("relations_added", summary.relations_added),
            ("ungrouped", summary.ungrouped.len()),
            ("errors", summary.errors.len()),
        ] {
            if value > 0 {
                output = output.with_metadata(key, value);
            }
        }
        if summary.cancelled {
            output = output.with_metadata("cancelled", true);
        }
        output
    }
}

/// Status of a registered job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_name: String,
    pub cron_expr: String,
    /// When the job last finished (if ever)
    pub last_run: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    pub last_result: Option<JobResult>,
    pub next_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub error_count: u64,
    pub is_running: bool,
    pub is_paused: bool,
    /// Counters reported by the last run
    #[serde(default)]
    pub last_run_metadata: HashMap<String, String>,
}

impl JobStatus {
    pub fn new(job_name: String, cron_expr: String) -> Self {
        Self {
            job_name,
            cron_expr,
            last_run: None,
            last_duration_ms: None,
            last_result: None,
            next_run: None,
            run_count: 0,
            error_count: 0,
            is_running: false,
            is_paused: false,
            last_run_metadata: HashMap::new(),
        }
    }
}

/// Thread-safe registry of job status.
///
/// # Example
///
/// ```
/// use news_scheduler::{JobRegistry, JobResult};
///
/// let registry = JobRegistry::new();
/// registry.register("event_detection", "0 */15 * * * *");
///
/// registry.record_start("event_detection");
/// assert!(registry.is_running("event_detection"));
///
/// registry.record_complete("event_detection", JobResult::Success, 1500);
/// assert!(!registry.is_running("event_detection"));
/// ```
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, JobStatus>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A panicking job must not take status reporting down with it
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, JobStatus>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, JobStatus>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a job. An existing entry with the same name is replaced.
    pub fn register(&self, job_name: &str, cron_expr: &str) {
        self.write().insert(
            job_name.to_string(),
            JobStatus::new(job_name.to_string(), cron_expr.to_string()),
        );
    }

    pub fn record_start(&self, job_name: &str) {
        if let Some(status) = self.write().get_mut(job_name) {
            status.is_running = true;
        }
    }

    pub fn record_complete(&self, job_name: &str, result: JobResult, duration_ms: u64) {
        self.record_complete_with_metadata(job_name, result, duration_ms, HashMap::new());
    }

    /// Record completion with counters from the run.
    pub fn record_complete_with_metadata(
        &self,
        job_name: &str,
        result: JobResult,
        duration_ms: u64,
        metadata: HashMap<String, String>,
    ) {
        if let Some(status) = self.write().get_mut(job_name) {
            status.is_running = false;
            status.last_run = Some(Utc::now());
            status.last_duration_ms = Some(duration_ms);
            status.run_count += 1;
            if matches!(result, JobResult::Failed(_)) {
                status.error_count += 1;
            }
            status.last_result = Some(result);
            status.last_run_metadata = metadata;
        }
    }

    pub fn set_next_run(&self, job_name: &str, next: DateTime<Utc>) {
        if let Some(status) = self.write().get_mut(job_name) {
            status.next_run = Some(next);
        }
    }

    pub fn set_paused(&self, job_name: &str, paused: bool) {
        if let Some(status) = self.write().get_mut(job_name) {
            status.is_paused = paused;
        }
    }

    pub fn get_status(&self, job_name: &str) -> Option<JobStatus> {
        self.read().get(job_name).cloned()
    }

    /// Status of every job, sorted by name.
    pub fn get_all_status(&self) -> Vec<JobStatus> {
        let mut all: Vec<JobStatus> = self.read().values().cloned().collect();
        all.sort_by(|a, b| a.job_name.cmp(&b.job_name));
        all
    }

    pub fn is_running(&self, job_name: &str) -> bool {
        self.read().get(job_name).is_some_and(|s| s.is_running)
    }

    /// True if any registered job is executing.
    pub fn any_running(&self) -> bool {
        self.read().values().any(|s| s.is_running)
    }

    pub fn is_registered(&self, job_name: &str) -> bool {
        self.read().contains_key(job_name)
    }

    pub fn is_paused(&self, job_name: &str) -> bool {
        self.read().get(job_name).is_some_and(|s| s.is_paused)
    }

    pub fn job_count(&self) -> usize {
        self.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_get() {
        let registry = JobRegistry::new();
        registry.register("event_labeling", "0 5 * * * *");

        let status = registry.get_status("event_labeling").unwrap();
        assert_eq!(status.job_name, "event_labeling");
        assert_eq!(status.cron_expr, "0 5 * * * *");
        assert_eq!(status.run_count, 0);
        assert!(!status.is_running);
        assert!(!status.is_paused);
    }

    #[test]
    fn test_record_complete_counts() {
        let registry = JobRegistry::new();
        registry.register("job", "0 0 * * * *");

        registry.record_start("job");
        assert!(registry.any_running());
        registry.record_complete("job", JobResult::Failed("timeout".into()), 5000);
        registry.record_complete("job", JobResult::Skipped("overlap".into()), 0);

        let status = registry.get_status("job").unwrap();
        assert!(!status.is_running);
        assert_eq!(status.run_count, 2);
        assert_eq!(status.error_count, 1);
        assert_eq!(status.last_result, Some(JobResult::Skipped("overlap".into())));
        assert!(!registry.any_running());
    }

    #[test]
    fn test_metadata_is_kept() {
        let registry = JobRegistry::new();
        registry.register("job", "0 0 * * * *");
        let output = JobOutput::new().with_metadata("events_created", 3);
        registry.record_complete_with_metadata("job", JobResult::Success, 10, output.metadata);

        let status = registry.get_status("job").unwrap();
        assert_eq!(
            status.last_run_metadata.get("events_created").map(String::as_str),
            Some("3")
        );
    }

    #[test]
    fn test_pause_and_next_run() {
        let registry = JobRegistry::new();
        registry.register("job", "0 0 * * * *");

        registry.set_paused("job", true);
        assert!(registry.is_paused("job"));
        registry.set_paused("job", false);
        assert!(!registry.is_paused("job"));

        let next = Utc::now();
        registry.set_next_run("job", next);
        assert_eq!(registry.get_status("job").unwrap().next_run, Some(next));
    }

    #[test]
    fn test_unknown_job_is_harmless() {
        let registry = JobRegistry::new();
        assert!(registry.get_status("unknown").is_none());
        assert!(!registry.is_running("unknown"));
        assert!(!registry.is_paused("unknown"));
        assert!(!registry.is_registered("unknown"));

        registry.record_start("unknown");
        registry.record_complete("unknown", JobResult::Success, 100);
        registry.set_paused("unknown", true);
        assert_eq!(registry.job_count(), 0);
    }

    #[test]
    fn test_all_status_sorted() {
        let registry = JobRegistry::new();
        registry.register("topic_detection", "0 30 */6 * * *");
        registry.register("event_detection", "0 */15 * * * *");

        let names: Vec<String> = registry
            .get_all_status()
            .into_iter()
            .map(|s| s.job_name)
            .collect();
        assert_eq!(names, vec!["event_detection", "topic_detection"]);
    }

    #[cfg(feature = "jobs")]
    #[test]
    fn test_output_from_summary() {
        let mut summary = news_types::RunSummary::begin("detect_and_merge_events", Utc::now());
        summary.events_created = 2;
        summary.cancelled = true;

        let output = JobOutput::from(&summary);
        assert_eq!(output.metadata.get("events_created").map(String::as_str), Some("2"));
        assert_eq!(output.metadata.get("cancelled").map(String::as_str), Some("true"));
        assert!(!output.metadata.contains_key("events_merged"));
    }
}
