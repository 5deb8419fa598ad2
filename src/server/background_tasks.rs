//! Background task startup functions
//!
//! Contains functions to start the scheduler loop and the lease-guarded
//! stale job report.

use super::config::AppConfig;
use super::tasks::StaleReport;
use anyhow::{Context, Result};
use jobwarden_core::scheduler::{ExecutorRegistry, LocalFuncExecutor, SchedulerError, SqliteJobStore};
use jobwarden_core::{
    GuardedJob, JobRunner, JobSchedule, LeaseGuard, Observability, RedisLockClient, Scheduler,
    SchedulerResult, ShutdownController,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// A running scheduler loop
pub struct SchedulerTask {
    pub scheduler: Arc<Scheduler>,
    pub task: JoinHandle<SchedulerResult<()>>,
}

/// A running periodic report
pub struct ReportTask {
    pub job: Arc<GuardedJob<StaleReport>>,
    pub task: JoinHandle<()>,
}

/// Local functions available to `local` store jobs
pub fn build_executors(config: &AppConfig, store: &Arc<SqliteJobStore>) -> ExecutorRegistry {
    let mut local = LocalFuncExecutor::new();
    StaleReport::new(
        store.clone(),
        Duration::from_secs(config.stale_report.older_than_secs),
    )
    .register(&mut local);

    ExecutorRegistry::new().with(Arc::new(local))
}

/// Start the job scheduler
///
/// A loop that gives up on store failures triggers process shutdown.
pub fn start_scheduler(
    config: &AppConfig,
    store: &Arc<SqliteJobStore>,
    obs: &Observability,
    shutdown_controller: &Arc<ShutdownController>,
) -> Result<Option<SchedulerTask>> {
    if !config.scheduler.enabled {
        info!("Scheduler disabled by configuration");
        return Ok(None);
    }

    let scheduler_config = config.scheduler_config()?;
    let scheduler = Arc::new(
        Scheduler::new(
            store.clone(),
            build_executors(config, store),
            scheduler_config,
        )
        .context("Failed to create scheduler")?
        .with_observability(obs.child("scheduler")),
    );

    let engine_for_run = scheduler.clone();
    let controller = shutdown_controller.clone();
    let token = shutdown_controller.token();
    let task = tokio::spawn(async move {
        match engine_for_run.start(token).await {
            Ok(()) | Err(SchedulerError::Cancelled) => {
                info!("Scheduler stopped");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Scheduler loop failed");
                controller.trigger();
                Err(e)
            }
        }
    });

    info!(
        "Scheduler started (max concurrent: {}, heartbeat: {}ms)",
        config.scheduler.max_concurrent, config.scheduler.heartbeat_interval_ms
    );

    Ok(Some(SchedulerTask { scheduler, task }))
}

/// Start the lease-guarded stale job report
pub fn start_stale_report(
    config: &AppConfig,
    store: &Arc<SqliteJobStore>,
    obs: &Observability,
    shutdown_controller: &ShutdownController,
) -> Result<Option<ReportTask>> {
    let report_config = &config.stale_report;
    if !report_config.enabled {
        info!("Stale job report disabled by configuration");
        return Ok(None);
    }

    let schedule = JobSchedule::parse(&report_config.expression)
        .context("Invalid [stale_report] expression")?;
    let client = RedisLockClient::new(&config.redis.url).context("Invalid [redis] url")?;
    let guard = LeaseGuard::new(Arc::new(client), report_config.key.clone(), config.lease_config()?)
        .context("Failed to create lease guard")?
        .with_observability(obs.child("lease"));

    let report = StaleReport::new(
        store.clone(),
        Duration::from_secs(report_config.older_than_secs),
    );
    let job = Arc::new(GuardedJob::new(report, guard));

    let runner = JobRunner::new(obs.child("periodic"));
    let task = runner.spawn(job.clone(), schedule, shutdown_controller.token());

    info!(
        key = %report_config.key,
        "Stale job report scheduled ({})",
        report_config.expression
    );

    Ok(Some(ReportTask { job, task }))
}
