//! Scheduler configuration.

use serde::{Deserialize, Serialize};

use crate::SchedulerError;

/// Configuration for the scheduler service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Default timezone for jobs (IANA timezone string, e.g., "Europe/Berlin").
    #[serde(default = "default_timezone")]
    pub default_timezone: String,

    /// Seconds running jobs are given to finish after shutdown is signalled.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_timezone: default_timezone(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl SchedulerConfig {
    /// Parse the configured timezone string into a chrono_tz::Tz.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidTimezone` if the timezone string
    /// is not a valid IANA timezone identifier.
    pub fn parse_timezone(&self) -> Result<chrono_tz::Tz, SchedulerError> {
        self.default_timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| SchedulerError::InvalidTimezone(self.default_timezone.clone()))
    }
}

/// Schedule settings for one pipeline job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobSchedule {
    /// Whether the job is registered at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Cron expression (6-field: sec min hour day month weekday)
    pub cron: String,

    /// IANA timezone; falls back to the scheduler default when unset
    #[serde(default)]
    pub timezone: Option<String>,

    /// Max jitter in seconds (0 = none)
    #[serde(default)]
    pub jitter_secs: u64,

    /// Timeout in seconds (0 = none)
    #[serde(default)]
    pub timeout_secs: u64,
}

fn default_enabled() -> bool {
    true
}

impl JobSchedule {
    pub fn new(cron: impl Into<String>, jitter_secs: u64, timeout_secs: u64) -> Self {
        Self {
            enabled: true,
            cron: cron.into(),
            timezone: None,
            jitter_secs,
            timeout_secs,
        }
    }
}

/// Schedules for the pipeline jobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobsConfig {
    /// Detect and merge events, then sweep stale ones
    #[serde(default = "default_event_detection")]
    pub event_detection: JobSchedule,

    /// Label events changed since the last pass
    #[serde(default = "default_event_labeling")]
    pub event_labeling: JobSchedule,

    /// Analyze events changed since the last pass
    #[serde(default = "default_event_analysis")]
    pub event_analysis: JobSchedule,

    /// Detect topics, then classify the new ones
    #[serde(default = "default_topic_detection")]
    pub topic_detection: JobSchedule,
}

fn default_event_detection() -> JobSchedule {
    // Every 15 minutes
    JobSchedule::new("0 */15 * * * *", 30, 600)
}

fn default_event_labeling() -> JobSchedule {
    // Five minutes after each detection slot
    JobSchedule::new("0 5,20,35,50 * * * *", 30, 600)
}

fn default_event_analysis() -> JobSchedule {
    // Ten minutes after each detection slot
    JobSchedule::new("0 10,25,40,55 * * * *", 30, 600)
}

fn default_topic_detection() -> JobSchedule {
    // Every 6 hours at :30
    JobSchedule::new("0 30 */6 * * *", 120, 1800)
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            event_detection: default_event_detection(),
            event_labeling: default_event_labeling(),
            event_analysis: default_event_analysis(),
            topic_detection: default_topic_detection(),
        }
    }
}

impl JobsConfig {
    /// Check every cron expression and timezone without registering jobs.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        for schedule in [
            &self.event_detection,
            &self.event_labeling,
            &self.event_analysis,
            &self.topic_detection,
        ] {
            crate::validate_cron_expression(&schedule.cron)?;
            if let Some(tz) = &schedule.timezone {
                crate::SchedulerService::parse_timezone(tz)?;
            }
        }
        Ok(())
    }
}
