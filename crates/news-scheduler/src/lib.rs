//! Background job scheduler for the news pipeline daemon.
//!
//! Wraps `tokio-cron-scheduler` with timezone-aware cron jobs, a status
//! registry, an overlap guard, jitter and per-run timeouts. Shutdown cancels
//! a token that every running job observes between units of work.
//!
//! # Example
//!
//! ```ignore
//! use news_scheduler::{SchedulerService, SchedulerConfig, OverlapPolicy, JitterConfig, TimeoutConfig};
//!
//! let scheduler = SchedulerService::new(SchedulerConfig::default()).await?;
//! scheduler.register_job(
//!     "event_detection",
//!     "0 */15 * * * *",
//!     None,
//!     OverlapPolicy::Skip,
//!     JitterConfig::new(30),
//!     TimeoutConfig::new(600),
//!     |token| async move { run_detection(token).await },
//! ).await?;
//! scheduler.start().await?;
//! ```

mod config;
mod error;
mod jitter;
mod overlap;
mod registry;
mod scheduler;
mod timeout;

#[cfg(feature = "jobs")]
pub mod jobs;

pub use config::{JobSchedule, JobsConfig, SchedulerConfig};
pub use error::SchedulerError;
pub use jitter::{with_jitter, JitterConfig};
pub use overlap::{OverlapGuard, OverlapPolicy, RunGuard};
pub use registry::{JobOutput, JobRegistry, JobResult, JobStatus};
pub use scheduler::{validate_cron_expression, SchedulerService};
pub use timeout::TimeoutConfig;
