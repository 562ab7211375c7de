//! Event detection job.
//!
//! One run reads articles past the detection watermark, creates or merges
//! events, then closes events that went stale.

use std::sync::Arc;

use chrono::Utc;
use news_events::{ArticleSource, EventLifecycle};
use tracing::info;

use crate::config::JobSchedule;
use crate::jobs::run_blocking;
use crate::{JitterConfig, OverlapPolicy, SchedulerError, SchedulerService, TimeoutConfig};

pub const JOB_NAME: &str = "event_detection";

/// Register the event detection job.
pub async fn create_event_detection_job(
    scheduler: &SchedulerService,
    lifecycle: Arc<EventLifecycle>,
    source: Arc<dyn ArticleSource>,
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
                let lifecycle = lifecycle.clone();
                let source = source.clone();
                run_blocking(JOB_NAME, move || {
                    let now = Utc::now();
                    let mut summary = lifecycle
                        .detect_and_merge_events(source.as_ref(), now, &token)
                        .map_err(|e| e.to_string())?;
                    let sweep = lifecycle
                        .sweep_stale_events(Utc::now(), &token)
                        .map_err(|e| e.to_string())?;
                    summary.absorb(sweep);
                    Ok(summary)
                })
            },
        )
        .await?;

    info!(cron = %schedule.cron, "Registered event detection job");
    Ok(())
}
