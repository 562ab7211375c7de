//! Scheduler service wrapper around tokio-cron-scheduler.
//!
//! Every job runs through the same envelope: pause check, overlap guard,
//! jitter, timeout, and a registry update with the run's counters.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono_tz::Tz;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::jitter::{with_jitter, JitterConfig};
use crate::overlap::{OverlapGuard, OverlapPolicy};
use crate::registry::{JobOutput, JobRegistry, JobResult};
use crate::timeout::TimeoutConfig;
use crate::{SchedulerConfig, SchedulerError};

/// Validate a 6-field cron expression (second minute hour day month weekday).
///
/// # Example
///
/// ```
/// use news_scheduler::validate_cron_expression;
///
/// assert!(validate_cron_expression("0 */15 * * * *").is_ok());
/// assert!(validate_cron_expression("invalid").is_err());
/// assert!(validate_cron_expression("").is_err());
/// ```
pub fn validate_cron_expression(expr: &str) -> Result<(), SchedulerError> {
    Job::new_async(expr, |_uuid, _lock| Box::pin(async {}))
        .map(|_| ())
        .map_err(|e| SchedulerError::InvalidCron(format!("'{}': {}", expr, e)))
}

/// Lifecycle wrapper around `JobScheduler`.
pub struct SchedulerService {
    scheduler: JobScheduler,
    config: SchedulerConfig,
    registry: Arc<JobRegistry>,
    shutdown_token: CancellationToken,
    is_running: AtomicBool,
}

impl SchedulerService {
    /// Create a scheduler. Jobs do not fire until `start()`.
    pub async fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.parse_timezone()?;
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            config,
            registry: Arc::new(JobRegistry::new()),
            shutdown_token: CancellationToken::new(),
            is_running: AtomicBool::new(false),
        })
    }

    /// Start firing jobs.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }
        self.scheduler.start().await?;
        info!(jobs = self.registry.job_count(), "Scheduler started");
        Ok(())
    }

    /// Signal running jobs to stop, wait for them up to the shutdown
    /// timeout, then stop the scheduler.
    pub async fn shutdown(&mut self) -> Result<(), SchedulerError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }

        info!("Initiating scheduler shutdown");
        self.shutdown_token.cancel();

        let deadline = Instant::now() + Duration::from_secs(self.config.shutdown_timeout_secs);
        while self.registry.any_running() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        if self.registry.any_running() {
            warn!("Jobs still running at shutdown deadline");
        }

        if let Err(e) = self.scheduler.shutdown().await {
            warn!(error = %e, "Error during scheduler shutdown");
        }

        self.is_running.store(false, Ordering::SeqCst);
        info!("Scheduler shutdown complete");
        Ok(())
    }

    /// Token cancelled when shutdown begins.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn registry(&self) -> Arc<JobRegistry> {
        self.registry.clone()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Pause a job; its ticks are recorded as skipped until resumed.
    pub fn pause_job(&self, name: &str) -> Result<(), SchedulerError> {
        if !self.registry.is_registered(name) {
            return Err(SchedulerError::JobNotFound(name.to_string()));
        }
        self.registry.set_paused(name, true);
        info!(job = %name, "Job paused");
        Ok(())
    }

    pub fn resume_job(&self, name: &str) -> Result<(), SchedulerError> {
        if !self.registry.is_registered(name) {
            return Err(SchedulerError::JobNotFound(name.to_string()));
        }
        self.registry.set_paused(name, false);
        info!(job = %name, "Job resumed");
        Ok(())
    }

    /// Parse an IANA timezone string.
    pub fn parse_timezone(tz_str: &str) -> Result<Tz, SchedulerError> {
        tz_str
            .parse()
            .map_err(|_| SchedulerError::InvalidTimezone(tz_str.to_string()))
    }

    /// Register a cron job.
    ///
    /// `job_fn` receives a token that is cancelled on shutdown or when the
    /// run exceeds its timeout; long-running work should stop at its next
    /// checkpoint once it fires.
    #[allow(clippy::too_many_arguments)]
    pub async fn register_job<F, Fut>(
        &self,
        name: &str,
        cron_expr: &str,
        timezone: Option<&str>,
        overlap: OverlapPolicy,
        jitter: JitterConfig,
        timeout: TimeoutConfig,
        job_fn: F,
    ) -> Result<uuid::Uuid, SchedulerError>
    where
        F: Fn(CancellationToken) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<JobOutput, String>> + Send + 'static,
    {
        let tz: Tz = match timezone {
            Some(tz_str) => Self::parse_timezone(tz_str)?,
            None => self.config.parse_timezone()?,
        };
        validate_cron_expression(cron_expr)?;

        self.registry.register(name, cron_expr);

        let job_name = name.to_string();
        let registry = self.registry.clone();
        let guard = Arc::new(OverlapGuard::new(overlap));
        let shutdown_token = self.shutdown_token.clone();

        let job = Job::new_async_tz(cron_expr, tz, move |_uuid, _lock| {
            let name = job_name.clone();
            let registry = registry.clone();
            let guard = guard.clone();
            let run_token = shutdown_token.child_token();
            let jitter = jitter.clone();
            let timeout = timeout.clone();
            let job_fn = job_fn.clone();

            Box::pin(async move {
                if registry.is_paused(&name) {
                    registry.record_complete(&name, JobResult::Skipped("paused".into()), 0);
                    return;
                }
                let Some(_run) = guard.try_acquire() else {
                    info!(job = %name, "Previous run still active, skipping");
                    registry.record_complete(
                        &name,
                        JobResult::Skipped("previous run still active".into()),
                        0,
                    );
                    return;
                };

                with_jitter(&jitter, async {
                    if run_token.is_cancelled() {
                        return;
                    }
                    registry.record_start(&name);
                    info!(job = %name, "Job started");
                    let start = Instant::now();

                    let run = job_fn(run_token.clone());
                    let outcome = match timeout.duration() {
                        Some(limit) => match tokio::time::timeout(limit, run).await {
                            Ok(outcome) => outcome,
                            Err(_) => {
                                run_token.cancel();
                                Err(format!("timed out after {}s", limit.as_secs()))
                            }
                        },
                        None => run.await,
                    };

                    let duration_ms = start.elapsed().as_millis() as u64;
                    match outcome {
                        Ok(output) => {
                            info!(job = %name, duration_ms, "Job completed");
                            registry.record_complete_with_metadata(
                                &name,
                                JobResult::Success,
                                duration_ms,
                                output.metadata,
                            );
                        }
                        Err(e) => {
                            error!(job = %name, duration_ms, error = %e, "Job failed");
                            registry.record_complete(&name, JobResult::Failed(e), duration_ms);
                        }
                    }
                })
                .await;
            })
        })
        .map_err(|e| SchedulerError::InvalidCron(e.to_string()))?;

        let uuid = self.scheduler.add(job).await?;
        info!(job = %name, uuid = %uuid, cron = %cron_expr, timezone = %tz.name(), "Job registered");
        Ok(uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn quick_config() -> SchedulerConfig {
        SchedulerConfig {
            shutdown_timeout_secs: 1,
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_stop() {
        let mut scheduler = SchedulerService::new(quick_config()).await.unwrap();

        scheduler.start().await.unwrap();
        assert!(scheduler.is_running());
        assert!(matches!(
            scheduler.start().await,
            Err(SchedulerError::AlreadyRunning)
        ));

        let token = scheduler.shutdown_token();
        scheduler.shutdown().await.unwrap();
        assert!(!scheduler.is_running());
        assert!(token.is_cancelled());
        assert!(matches!(
            scheduler.shutdown().await,
            Err(SchedulerError::NotRunning)
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invalid_timezone_config() {
        let config = SchedulerConfig {
            default_timezone: "Invalid/Zone".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            SchedulerService::new(config).await,
            Err(SchedulerError::InvalidTimezone(_))
        ));
    }

    #[test]
    fn test_validate_cron_expression() {
        assert!(validate_cron_expression("0 0 * * * *").is_ok());
        assert!(validate_cron_expression("0 5,20,35,50 * * * *").is_ok());
        assert!(validate_cron_expression("* * *").is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_register_job_rejects_bad_input() {
        let scheduler = SchedulerService::new(quick_config()).await.unwrap();

        let bad_cron = scheduler
            .register_job(
                "bad",
                "invalid-cron",
                None,
                OverlapPolicy::Skip,
                JitterConfig::none(),
                TimeoutConfig::none(),
                |_token| async { Ok(JobOutput::new()) },
            )
            .await;
        assert!(matches!(bad_cron, Err(SchedulerError::InvalidCron(_))));

        let bad_tz = scheduler
            .register_job(
                "bad",
                "0 0 * * * *",
                Some("Invalid/Timezone"),
                OverlapPolicy::Skip,
                JitterConfig::none(),
                TimeoutConfig::none(),
                |_token| async { Ok(JobOutput::new()) },
            )
            .await;
        assert!(matches!(bad_tz, Err(SchedulerError::InvalidTimezone(_))));
        assert!(!scheduler.registry().is_registered("bad"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_registered_job_runs_and_reports() {
        let mut scheduler = SchedulerService::new(quick_config()).await.unwrap();
        let counter = Arc::new(AtomicU32::new(0));
        let seen = counter.clone();

        scheduler
            .register_job(
                "tick",
                "*/1 * * * * *",
                Some("UTC"),
                OverlapPolicy::Skip,
                JitterConfig::none(),
                TimeoutConfig::new(5),
                move |_token| {
                    let seen = seen.clone();
                    async move {
                        seen.fetch_add(1, Ordering::SeqCst);
                        Ok(JobOutput::new().with_metadata("events_created", 1))
                    }
                },
            )
            .await
            .unwrap();
        assert!(scheduler.registry().is_registered("tick"));

        scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        scheduler.shutdown().await.unwrap();

        assert!(counter.load(Ordering::SeqCst) >= 1);
        let status = scheduler.registry().get_status("tick").unwrap();
        assert!(status.run_count >= 1);
        assert_eq!(status.error_count, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pause_unknown_job() {
        let scheduler = SchedulerService::new(quick_config()).await.unwrap();
        assert!(matches!(
            scheduler.pause_job("missing"),
            Err(SchedulerError::JobNotFound(_))
        ));
    }
}
