//! Timer-driven jobs
//!
//! Some work runs on a plain timer in every process instead of being pulled
//! from the job store. [`JobRunner`] drives such a [`PeriodicJob`] on a
//! schedule and records how each run went; wrapping the job in a
//! [`GuardedJob`] restricts each run to the process holding its lease.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Instrument};

use crate::lease::{LeaseGuard, LeaseResult, TickOutcome};
use crate::observability::Observability;
use crate::scheduler::{ExecError, JobSchedule};
use crate::utils::Timer;

/// A job run by a timer
#[async_trait]
pub trait PeriodicJob: Send + Sync {
    /// Name used in logs and metric labels
    fn name(&self) -> &str;

    /// Run once. `cancel` fires on shutdown.
    async fn run(&self, cancel: CancellationToken) -> std::result::Result<(), ExecError>;
}

/// Runs periodic jobs and records their outcome
#[derive(Clone, Default)]
pub struct JobRunner {
    obs: Observability,
}

impl JobRunner {
    /// Create a runner recording into `obs`
    pub fn new(obs: Observability) -> Self {
        Self { obs }
    }

    /// Run `job` once. Returns whether it succeeded; failures are logged,
    /// never propagated.
    pub async fn run_once(&self, job: &dyn PeriodicJob, cancel: &CancellationToken) -> bool {
        let name = job.name().to_string();
        debug!(job = %name, "Periodic job starting");

        let timer = Timer::start();
        let result = job.run(cancel.clone()).await;
        let elapsed_ms = timer.elapsed_ms();

        let success = result.is_ok();
        self.obs.observe_ms(
            "periodic_job_duration_ms",
            &[
                ("job", name.as_str()),
                ("success", if success { "true" } else { "false" }),
            ],
            elapsed_ms,
        );

        match result {
            Ok(()) => debug!(job = %name, elapsed_ms, "Periodic job finished"),
            Err(e) => error!(job = %name, elapsed_ms, error = %e, "Periodic job failed"),
        }
        success
    }

    /// Run `job` at every instant of `schedule` until `shutdown` fires
    pub fn spawn(
        &self,
        job: Arc<dyn PeriodicJob>,
        schedule: JobSchedule,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let runner = self.clone();
        let span = tracing::info_span!("periodic", job = %job.name());

        tokio::spawn(
            async move {
                info!(expression = %schedule.expression(), "Periodic job scheduled");
                loop {
                    let now = Utc::now();
                    let next = match schedule.next_after(now) {
                        Ok(next) => next,
                        Err(e) => {
                            error!(error = %e, "Periodic job has no upcoming run");
                            break;
                        }
                    };
                    let wait = (next - now).to_std().unwrap_or(Duration::ZERO);

                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(wait) => {}
                    }

                    runner.run_once(job.as_ref(), &shutdown).await;
                }
                info!("Periodic job stopped");
            }
            .instrument(span),
        )
    }
}

/// A [`PeriodicJob`] that only runs while its lease is held
pub struct GuardedJob<J> {
    inner: J,
    guard: LeaseGuard,
}

impl<J: PeriodicJob> GuardedJob<J> {
    /// Guard `inner` with `guard`
    pub fn new(inner: J, guard: LeaseGuard) -> Self {
        Self { inner, guard }
    }

    /// The lease guard
    pub fn guard(&self) -> &LeaseGuard {
        &self.guard
    }

    /// Give the lease up
    pub async fn close(&self) -> LeaseResult<()> {
        self.guard.close().await
    }
}

#[async_trait]
impl<J: PeriodicJob> PeriodicJob for GuardedJob<J> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn run(&self, cancel: CancellationToken) -> std::result::Result<(), ExecError> {
        match self.guard.run(|| self.inner.run(cancel)).await {
            Ok(TickOutcome::Executed) => Ok(()),
            Ok(TickOutcome::Skipped) => {
                debug!(job = %self.inner.name(), "Lease held elsewhere, tick skipped");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
