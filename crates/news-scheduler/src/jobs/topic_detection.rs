//! Topic detection job.
//!
//! Clusters recent events into topics and classifies each topic the run
//! created against all existing topics.

use std::sync::Arc;

use chrono::Utc;
use news_topics::{TopicAggregator, TopicHierarchy};
use tracing::info;

use crate::config::JobSchedule;
use crate::jobs::run_blocking;
use crate::{JitterConfig, OverlapPolicy, SchedulerError, SchedulerService, TimeoutConfig};

pub const JOB_NAME: &str = "topic_detection";

/// Register the topic detection job.
pub async fn create_topic_detection_job(
    scheduler: &SchedulerService,
    aggregator: Arc<TopicAggregator>,
    hierarchy: Arc<TopicHierarchy>,
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
                let aggregator = aggregator.clone();
                let hierarchy = hierarchy.clone();
                run_blocking(JOB_NAME, move || {
                    let now = Utc::now();
                    let detection = aggregator
                        .detect_topics(now, &token)
                        .map_err(|e| e.to_string())?;
                    let mut summary = detection.summary;
                    if !detection.created.is_empty() {
                        let classified = hierarchy
                            .classify_topics(&detection.created, now, &token)
                            .map_err(|e| e.to_string())?;
                        summary.absorb(classified);
                    }
                    Ok(summary)
                })
            },
        )
        .await?;

    info!(cron = %schedule.cron, "Registered topic detection job");
    Ok(())
}
