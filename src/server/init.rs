//! Worker initialization and run loop

use super::background_tasks::{start_scheduler, start_stale_report};
use super::config::AppConfig;
use anyhow::{anyhow, Context, Result};
use jobwarden_core::{shutdown_on_signal, Observability, ShutdownController, SqliteJobStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Run the worker until SIGINT/SIGTERM or a fatal scheduler error
pub async fn run(config: AppConfig) -> Result<()> {
    info!("Starting jobwarden worker v{}", env!("CARGO_PKG_VERSION"));

    let shutdown_controller =
        ShutdownController::with_timeout(Duration::from_secs(config.scheduler.drain_timeout_secs));
    let obs = Observability::new("jobwarden");

    let store = Arc::new(
        SqliteJobStore::from_path(&config.database.path)
            .await
            .with_context(|| {
                format!("Failed to open job store at {}", config.database.path.display())
            })?,
    );
    info!(path = %config.database.path.display(), "Job store opened");

    let scheduler = start_scheduler(&config, &store, &obs, &shutdown_controller)?;
    let report = start_stale_report(&config, &store, &obs, &shutdown_controller)?;

    if scheduler.is_none() && report.is_none() {
        warn!("Scheduler and stale report are both disabled, nothing to run");
        store.close().await;
        return Ok(());
    }

    tokio::spawn(shutdown_on_signal(shutdown_controller.clone()));
    info!("jobwarden worker running. Press Ctrl+C to stop.");

    shutdown_controller.token().cancelled().await;

    let mut outcome: Result<()> = Ok(());
    let drain_limit = shutdown_controller.timeout();
    let clean = shutdown_controller
        .drain(async {
            let mut clean = true;
            if let Some(scheduler) = scheduler {
                match scheduler.task.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => outcome = Err(anyhow!(e).context("Scheduler loop failed")),
                    Err(e) => outcome = Err(anyhow!("Scheduler task panicked: {}", e)),
                }
                clean &= scheduler.scheduler.drain(drain_limit).await;
            }
            if let Some(report) = report {
                if let Err(e) = report.task.await {
                    warn!(error = %e, "Stale report task ended abnormally");
                    clean = false;
                }
                if let Err(e) = report.job.close().await {
                    warn!(error = %e, "Failed to release stale report lease");
                    clean = false;
                }
            }
            clean
        })
        .await;

    if !clean {
        warn!("Shutdown finished with in-flight work abandoned");
    }

    store.close().await;
    debug!(metrics = %obs.metrics().export_prometheus(), "Final metrics snapshot");
    info!("jobwarden worker stopped");

    outcome
}
