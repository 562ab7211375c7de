//! Event analysis job.

use std::sync::Arc;

use chrono::Utc;
use news_events::EventAnalyzer;
use tracing::info;

use crate::config::JobSchedule;
use crate::jobs::run_blocking;
use crate::{JitterConfig, OverlapPolicy, SchedulerError, SchedulerService, TimeoutConfig};

pub const JOB_NAME: &str = "event_analysis";

/// Register the analysis job. Each run re-analyzes events updated since the
/// previous completed run.
pub async fn create_event_analysis_job(
    scheduler: &SchedulerService,
    analyzer: Arc<EventAnalyzer>,
    schedule: &JobSchedule,
) -> Result<(), SchedulerError> {
    scheduler
        .register_job(
            JOB_NAME,
            &schedule.cron,
            schedule.timezone.as_deref(),
            OverlapPolicy::Skip,
            JitterConfig::new(schedule.jitter_secs),
            TimeoutConfig::new(schedule.timeout_secs),
            move |token| {
                let analyzer = analyzer.clone();
                run_blocking(JOB_NAME, move || {
                    analyzer
                        .analyze_pending(Utc::now(), &token)
                        .map_err(|e| e.to_string())
                })
            },
        )
        .await?;

    info!(cron = %schedule.cron, "Registered event analysis job");
    Ok(())
}
