//! Scheduling loop
//!
//! One logical loop per process pulls due jobs from the shared store and
//! hands each to its executor on a separate task. A counting semaphore caps
//! in-flight executions; every other coordination happens in the store.
//!
//! Per cycle: acquire permit, preempt (bounded by `db_timeout`), resolve the
//! executor, dispatch. The dispatched task owns the permit and the
//! [`PreemptedJob`]; it reschedules on success, then stops the heartbeat,
//! releases the job and finally drops the permit.
//!
//! A preemption that completes after `db_timeout` is still released: the
//! store call runs on its own task and is never dropped mid-commit. A job no
//! executor can run is pushed to its next scheduled run and released, so it
//! cannot hold the head of the scan.

use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use super::config::SchedulerConfig;
use super::executor::{Executor, ExecutorRegistry};
use super::handle::PreemptedJob;
use super::store::JobStore;
use super::types::{Job, Result, SchedulerError};
use crate::observability::Observability;
use crate::utils::{RetryPolicy, Timer};

/// How one execution ended
#[derive(Debug)]
enum Outcome {
    Success,
    Failed(String),
    Panicked(String),
    TimedOut,
}

impl Outcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed(_) => "failure",
            Self::Panicked(_) => "panic",
            Self::TimedOut => "timeout",
        }
    }
}

/// Preemptive job scheduler
pub struct Scheduler {
    store: Arc<dyn JobStore>,
    executors: ExecutorRegistry,
    config: SchedulerConfig,
    limiter: Arc<Semaphore>,
    store_error_policy: RetryPolicy,
    obs: Observability,
}

impl Scheduler {
    /// Create a scheduler over `store` dispatching to `executors`
    pub fn new(
        store: Arc<dyn JobStore>,
        executors: ExecutorRegistry,
        config: SchedulerConfig,
    ) -> Result<Self> {
        config.validate()?;
        let limiter = Arc::new(Semaphore::new(config.max_concurrent));
        let store_error_policy = config.store_error_policy();
        Ok(Self {
            store,
            executors,
            config,
            limiter,
            store_error_policy,
            obs: Observability::new("scheduler"),
        })
    }

    /// Record logs and metrics through `obs`
    pub fn with_observability(mut self, obs: Observability) -> Self {
        self.obs = obs;
        self
    }

    /// Active configuration
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Permits currently held by dispatched executions
    pub fn running_count(&self) -> usize {
        self.config
            .max_concurrent
            .saturating_sub(self.limiter.available_permits())
    }

    /// Run the loop until `cancel` fires or the store keeps failing.
    ///
    /// Returns `Err(Cancelled)` on cancellation. Executions already
    /// dispatched keep running on a child token; use [`drain`](Self::drain)
    /// to wait for them.
    pub async fn start(&self, cancel: CancellationToken) -> Result<()> {
        let span = self.obs.span();
        self.run_loop(&cancel).instrument(span).await
    }

    async fn run_loop(&self, cancel: &CancellationToken) -> Result<()> {
        info!(
            max_concurrent = self.config.max_concurrent,
            executors = ?self.executors.names(),
            "Scheduler starting"
        );

        let mut store_errors = 0u32;
        loop {
            if cancel.is_cancelled() {
                info!("Scheduler stopping");
                return Err(SchedulerError::Cancelled);
            }

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Scheduler stopping");
                    return Err(SchedulerError::Cancelled);
                }
                permit = self.limiter.clone().acquire_owned() => {
                    permit.map_err(|_| SchedulerError::Cancelled)?
                }
            };

            let preempted = self.preempt().await;

            let job = match preempted {
                Ok(job) => {
                    store_errors = 0;
                    self.obs
                        .incr("scheduler_preempt_total", &[("outcome", "preempted")]);
                    job
                }
                Err(SchedulerError::NoJobAvailable) => {
                    store_errors = 0;
                    self.obs.incr("scheduler_preempt_total", &[("outcome", "idle")]);
                    drop(permit);
                    self.back_off(cancel).await?;
                    continue;
                }
                Err(e) => {
                    store_errors += 1;
                    self.obs.incr("scheduler_preempt_total", &[("outcome", "error")]);
                    drop(permit);
                    if store_errors >= self.config.max_consecutive_store_errors {
                        error!(
                            error = %e,
                            consecutive = store_errors,
                            "Job store keeps failing, stopping scheduler"
                        );
                        return Err(e);
                    }
                    let delay = self.store_error_policy.delay_after(store_errors);
                    warn!(
                        error = %e,
                        consecutive = store_errors,
                        delay_ms = delay.as_millis() as u64,
                        "Preempt failed"
                    );
                    self.pause(cancel, delay).await?;
                    continue;
                }
            };

            let executor = match self.executors.resolve(&job) {
                Ok(executor) => executor,
                Err(e) => {
                    error!(
                        job_id = job.id,
                        job_name = %job.name,
                        error = %e,
                        "Abandoning job nobody can run"
                    );
                    self.obs.incr("scheduler_abandoned_total", &[("executor", job.executor.as_str())]);
                    self.abandon(&job).await;
                    drop(permit);
                    continue;
                }
            };

            self.dispatch(job, executor, permit, cancel);
        }
    }

    /// Wait up to `limit` for in-flight executions to finish.
    ///
    /// Returns `true` once every permit is back.
    pub async fn drain(&self, limit: Duration) -> bool {
        let all = u32::try_from(self.config.max_concurrent).unwrap_or(u32::MAX);
        match timeout(limit, self.limiter.acquire_many(all)).await {
            Ok(Ok(_permits)) => true,
            Ok(Err(_)) => false,
            Err(_) => {
                warn!(running = self.running_count(), "Drain timed out");
                false
            }
        }
    }

    async fn back_off(&self, cancel: &CancellationToken) -> Result<()> {
        self.pause(cancel, self.config.idle_backoff).await
    }

    async fn pause(&self, cancel: &CancellationToken, delay: Duration) -> Result<()> {
        if delay.is_zero() {
            tokio::task::yield_now().await;
            return Ok(());
        }
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Scheduler stopping");
                Err(SchedulerError::Cancelled)
            }
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    /// Claim a job under `db_timeout`.
    ///
    /// The store call runs on its own task. If it wins a job after the
    /// deadline, that task releases the job.
    async fn preempt(&self) -> Result<Job> {
        let store = self.store.clone();
        let mut task = tokio::spawn(async move { store.preempt().await });

        match timeout(self.config.db_timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(SchedulerError::Transaction(format!("preempt task failed: {}", e))),
            Err(_) => {
                let store = self.store.clone();
                let obs = self.obs.clone();
                let release_timeout = self.config.release_timeout;
                tokio::spawn(
                    async move {
                        let Ok(Ok(job)) = task.await else {
                            return;
                        };
                        warn!(job_id = job.id, "Preempted after the deadline, releasing");
                        obs.incr("scheduler_preempt_total", &[("outcome", "late")]);
                        release_job(store.as_ref(), job.id, release_timeout).await;
                    }
                    .in_current_span(),
                );
                Err(SchedulerError::Timeout("preempt"))
            }
        }
    }

    /// Push `job` past this cycle and put it back to waiting
    async fn abandon(&self, job: &Job) {
        let next = job.next_time_after(Utc::now()).unwrap_or_else(|e| {
            warn!(job_id = job.id, error = %e, "No next run for abandoned job, using abandon_delay");
            Utc::now()
                + chrono::Duration::from_std(self.config.abandon_delay)
                    .unwrap_or_else(|_| chrono::Duration::minutes(1))
        });

        match timeout(self.config.db_timeout, self.store.update_next_time(job.id, next)).await {
            Ok(Ok(())) => debug!(job_id = job.id, next_time = %next, "Abandoned job deferred"),
            Ok(Err(e)) => error!(job_id = job.id, error = %e, "Failed to defer abandoned job"),
            Err(_) => error!(job_id = job.id, "Deferring abandoned job timed out"),
        }
        release_job(self.store.as_ref(), job.id, self.config.release_timeout).await;
    }

    fn dispatch(
        &self,
        job: Job,
        executor: Arc<dyn Executor>,
        permit: OwnedSemaphorePermit,
        cancel: &CancellationToken,
    ) {
        let span = tracing::info_span!(
            "job",
            job_id = job.id,
            job_name = %job.name,
            executor = %job.executor,
            version = job.version
        );
        let handle = PreemptedJob::start(job, self.store.clone(), &self.config);
        let store = self.store.clone();
        let config = self.config.clone();
        let obs = self.obs.clone();
        let exec_cancel = cancel.child_token();

        tokio::spawn(
            async move {
                run_job(handle, executor, store, &config, &obs, exec_cancel).await;
                drop(permit);
            }
            .instrument(span),
        );
    }
}

async fn run_job(
    handle: PreemptedJob,
    executor: Arc<dyn Executor>,
    store: Arc<dyn JobStore>,
    config: &SchedulerConfig,
    obs: &Observability,
    cancel: CancellationToken,
) {
    let job = handle.job().clone();
    let running = obs.metrics().gauge("scheduler_running");
    running.inc();
    debug!("Executing job");

    let timer = Timer::start();
    let work = AssertUnwindSafe(executor.exec(cancel.clone(), &job)).catch_unwind();
    let outcome = match timeout(config.execution_timeout, work).await {
        Ok(Ok(Ok(()))) => Outcome::Success,
        Ok(Ok(Err(e))) => Outcome::Failed(e.to_string()),
        Ok(Err(panic)) => Outcome::Panicked(panic_message(panic.as_ref())),
        Err(_) => {
            cancel.cancel();
            Outcome::TimedOut
        }
    };
    let elapsed_ms = timer.elapsed_ms();

    let executor_name = executor.name().to_string();
    obs.incr(
        "scheduler_executions_total",
        &[("executor", executor_name.as_str()), ("outcome", outcome.label())],
    );
    obs.observe_ms(
        "scheduler_execution_duration_ms",
        &[("executor", executor_name.as_str())],
        elapsed_ms,
    );

    match &outcome {
        Outcome::Success => {
            info!(elapsed_ms, "Job succeeded");
            reschedule(&job, store.as_ref(), config.db_timeout).await;
        }
        Outcome::Failed(e) => error!(elapsed_ms, error = %e, "Job failed"),
        Outcome::Panicked(msg) => error!(elapsed_ms, panic = %msg, "Job panicked"),
        Outcome::TimedOut => error!(
            timeout_secs = config.execution_timeout.as_secs(),
            "Job timed out"
        ),
    }

    // Failures are logged inside release.
    let _ = handle.release().await;
    running.dec();
}

async fn release_job(store: &dyn JobStore, id: i64, release_timeout: Duration) {
    match timeout(release_timeout, store.release(id)).await {
        Ok(Ok(())) => debug!(job_id = id, "Job released"),
        Ok(Err(e)) => error!(job_id = id, error = %e, "Failed to release job"),
        Err(_) => error!(job_id = id, "Releasing job timed out"),
    }
}

async fn reschedule(job: &Job, store: &dyn JobStore, db_timeout: Duration) {
    let next = match job.next_time_after(Utc::now()) {
        Ok(next) => next,
        Err(e) => {
            error!(error = %e, expression = %job.expression, "Cannot compute next run");
            return;
        }
    };

    match timeout(db_timeout, store.update_next_time(job.id, next)).await {
        Ok(Ok(())) => debug!(next_time = %next, "Job rescheduled"),
        Ok(Err(e)) => error!(error = %e, "Failed to reschedule job"),
        Err(_) => error!("Rescheduling job timed out"),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
