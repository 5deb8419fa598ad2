//! Runtime handle for a preempted job
//!
//! A [`PreemptedJob`] owns the heartbeat that keeps `utime` fresh while the
//! job runs. [`PreemptedJob::release`] consumes the handle, so the release
//! path runs at most once; dropping an unreleased handle (a panicking
//! execution, an aborted task) still stops the heartbeat and schedules a
//! best-effort release.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use super::config::SchedulerConfig;
use super::store::JobStore;
use super::types::{Job, Result, SchedulerError};

/// Periodic `utime` refresh for one held job
pub struct Heartbeat {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Heartbeat {
    /// Start refreshing `job_id` every `interval`, bounding each call by `db_timeout`
    pub fn start(
        store: Arc<dyn JobStore>,
        job_id: i64,
        interval: Duration,
        db_timeout: Duration,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        match timeout(db_timeout, store.update_utime(job_id)).await {
                            Ok(Ok(())) => trace!(job_id, "Heartbeat refreshed"),
                            Ok(Err(e)) => error!(job_id, error = %e, "Heartbeat failed"),
                            Err(_) => error!(job_id, "Heartbeat timed out"),
                        }
                    }
                }
            }
        });

        Self {
            cancel,
            task: Some(task),
        }
    }

    /// Stop the heartbeat and wait for its task to exit
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Heartbeat task ended abnormally");
            }
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// A job this process holds, plus its release obligation
pub struct PreemptedJob {
    job: Job,
    store: Arc<dyn JobStore>,
    heartbeat: Option<Heartbeat>,
    release_timeout: Duration,
}

impl PreemptedJob {
    /// Wrap a freshly preempted job and start its heartbeat
    pub fn start(job: Job, store: Arc<dyn JobStore>, config: &SchedulerConfig) -> Self {
        let heartbeat = Heartbeat::start(
            store.clone(),
            job.id,
            config.heartbeat_interval,
            config.db_timeout,
        );
        Self {
            job,
            store,
            heartbeat: Some(heartbeat),
            release_timeout: config.release_timeout,
        }
    }

    /// The held job
    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Stop the heartbeat, then return the job to waiting.
    ///
    /// Uses its own timeout so it still runs after the scheduler has been
    /// cancelled.
    pub async fn release(mut self) -> Result<()> {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.stop().await;
        }

        let job_id = self.job.id;
        match timeout(self.release_timeout, self.store.release(job_id)).await {
            Ok(Ok(())) => {
                debug!(job_id, "Job released");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(job_id, error = %e, "Failed to release job");
                Err(e)
            }
            Err(_) => {
                error!(job_id, "Releasing job timed out");
                Err(SchedulerError::Timeout("release"))
            }
        }
    }
}

impl Drop for PreemptedJob {
    fn drop(&mut self) {
        // `release` empties the heartbeat slot; anything else is an abnormal exit.
        let Some(heartbeat) = self.heartbeat.take() else {
            return;
        };
        drop(heartbeat);

        let job_id = self.job.id;
        warn!(job_id, "Preempted job dropped without release, releasing in background");
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let store = self.store.clone();
            let release_timeout = self.release_timeout;
            runtime.spawn(async move {
                match timeout(release_timeout, store.release(job_id)).await {
                    Ok(Ok(())) => debug!(job_id, "Job released after abnormal exit"),
                    Ok(Err(e)) => error!(job_id, error = %e, "Failed to release job"),
                    Err(_) => error!(job_id, "Releasing job timed out"),
                }
            });
        }
    }
}

#[cfg(test)]
mod tests;
