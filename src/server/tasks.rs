//! Built-in jobs shipped with the worker
//!
//! `StaleReport` lists Running jobs whose heartbeat stopped. It runs as a
//! lease-guarded periodic job (one report per cluster per tick) and is also
//! registered as a local function so operators can schedule it as a store job.

use async_trait::async_trait;
use jobwarden_core::scheduler::{now_millis, ExecError, Job, LocalFuncExecutor, SqliteJobStore};
use jobwarden_core::{PeriodicJob, SchedulerResult};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Job name and local function name of the stale report
pub const STALE_REPORT: &str = "stale_report";

/// Reports jobs stuck in Running
#[derive(Clone)]
pub struct StaleReport {
    store: Arc<SqliteJobStore>,
    older_than: Duration,
}

impl StaleReport {
    pub fn new(store: Arc<SqliteJobStore>, older_than: Duration) -> Self {
        Self { store, older_than }
    }

    /// Log and return every Running job whose `utime` is older than the threshold
    pub async fn report(&self) -> SchedulerResult<Vec<Job>> {
        let older_than_ms = i64::try_from(self.older_than.as_millis()).unwrap_or(i64::MAX);
        let cutoff = now_millis().saturating_sub(older_than_ms);
        let stale = self.store.list_stale(cutoff).await?;

        if stale.is_empty() {
            debug!("No stale jobs");
        }
        for job in &stale {
            warn!(
                job_id = job.id,
                job_name = %job.name,
                executor = %job.executor,
                idle_ms = now_millis() - job.utime,
                "Running job stopped heartbeating"
            );
        }
        Ok(stale)
    }

    /// Register the report under [`STALE_REPORT`]
    pub fn register(&self, local: &mut LocalFuncExecutor) {
        let report = self.clone();
        local.register_fn(STALE_REPORT, move |_cancel, _job| {
            let report = report.clone();
            async move { report.report().await.map(|_| ()).map_err(ExecError::from) }
        });
    }
}

#[async_trait]
impl PeriodicJob for StaleReport {
    fn name(&self) -> &str {
        STALE_REPORT
    }

    async fn run(&self, cancel: CancellationToken) -> Result<(), ExecError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err("stale report cancelled".into()),
            result = self.report() => result.map(|_| ()).map_err(ExecError::from),
        }
    }
}

#[cfg(test)]
mod tests;
