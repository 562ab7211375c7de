//! Event labeling job.

use std::sync::Arc;

use chrono::Utc;
use news_events::EventLabeler;
use tracing::info;

use crate::config::JobSchedule;
use crate::jobs::run_blocking;
use crate::{JitterConfig, OverlapPolicy, SchedulerError, SchedulerService, TimeoutConfig};

pub const JOB_NAME: &str = "event_labeling";

/// Register the labeling job. Each run labels events updated since the
/// previous completed run.
pub async fn create_event_labeling_job(
    scheduler: &SchedulerService,
    labeler: Arc<EventLabeler>,
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
                let labeler = labeler.clone();
                run_blocking(JOB_NAME, move || {
                    labeler
                        .label_pending(Utc::now(), &token)
                        .map_err(|e| e.to_string())
                })
            },
        )
        .await?;

    info!(cron = %schedule.cron, "Registered event labeling job");
    Ok(())
}
