//! Job store administration commands
//!
//! `jobwarden jobs add`: insert a job
//! `jobwarden jobs list`: show every job
//! `jobwarden jobs pause`: exclude a job from scheduling
//! `jobwarden jobs resume`: make a paused job eligible again
//! `jobwarden jobs stale`: show Running jobs whose heartbeat stopped
//! `jobwarden jobs delete`: remove a job

use crate::server::config::AppConfig;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use jobwarden_core::scheduler::{now_millis, validate_expression, Job, NewJob, SqliteJobStore};

#[derive(Subcommand, Debug)]
pub enum JobsCommand {
    /// Insert a new job
    Add {
        /// Unique job name (also the local function name for the `local` executor)
        #[arg(long)]
        name: String,
        /// Executor the job runs on
        #[arg(long, default_value = "local")]
        executor: String,
        /// Cron expression (5 or 6 fields) or descriptor such as @hourly
        #[arg(long)]
        expression: String,
        /// Opaque configuration passed to the executor
        #[arg(long, default_value = "")]
        cfg: String,
        /// First eligible run in epoch milliseconds (default: now)
        #[arg(long)]
        next_time_ms: Option<i64>,
    },
    /// List all jobs
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Pause a job
    Pause { id: i64 },
    /// Resume a paused job
    Resume { id: i64 },
    /// List Running jobs with no heartbeat for the given time
    Stale {
        #[arg(long, default_value_t = 180)]
        older_than_secs: u64,
    },
    /// Delete a job
    Delete { id: i64 },
}

/// Run a jobs subcommand.
pub async fn run(cmd: JobsCommand, config: &AppConfig) -> Result<()> {
    let store = SqliteJobStore::from_path(&config.database.path)
        .await
        .with_context(|| format!("Failed to open job store at {}", config.database.path.display()))?;

    let result = execute(cmd, &store).await;
    store.close().await;
    result
}

async fn execute(cmd: JobsCommand, store: &SqliteJobStore) -> Result<()> {
    match cmd {
        JobsCommand::Add {
            name,
            executor,
            expression,
            cfg,
            next_time_ms,
        } => {
            validate_expression(&expression)
                .with_context(|| format!("Invalid expression '{}'", expression))?;
            let mut new_job = NewJob::new(name, executor, expression).with_cfg(cfg);
            if let Some(next_time) = next_time_ms {
                new_job = new_job.with_next_time(next_time);
            }
            let job = store.create_job(&new_job).await.context("Failed to create job")?;
            println!("✅ Created job #{} '{}'", job.id, job.name);
            print_table(&[job]);
        }
        JobsCommand::List { json } => {
            let jobs = store.list_jobs().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&jobs)?);
            } else if jobs.is_empty() {
                println!("No jobs.");
            } else {
                print_table(&jobs);
            }
        }
        JobsCommand::Pause { id } => {
            store.pause(id).await.with_context(|| format!("Failed to pause job #{}", id))?;
            println!("⏸  Paused job #{}", id);
        }
        JobsCommand::Resume { id } => {
            store.resume(id).await.with_context(|| format!("Failed to resume job #{}", id))?;
            println!("▶  Resumed job #{}", id);
        }
        JobsCommand::Stale { older_than_secs } => {
            let older_than_ms = i64::try_from(older_than_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
            let stale = store.list_stale(now_millis().saturating_sub(older_than_ms)).await?;
            if stale.is_empty() {
                println!("No stale jobs (threshold {}s).", older_than_secs);
            } else {
                println!("⚠️  {} job(s) without heartbeat for {}s:", stale.len(), older_than_secs);
                print_table(&stale);
            }
        }
        JobsCommand::Delete { id } => {
            store.delete_job(id).await.with_context(|| format!("Failed to delete job #{}", id))?;
            println!("🗑  Deleted job #{}", id);
        }
    }
    Ok(())
}

// ── Helpers ──────────────────────────────────────────────────────────

fn format_millis(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "—".to_string())
}

fn print_table(jobs: &[Job]) {
    println!(
        "{:<6} {:<24} {:<10} {:<18} {:<8} {:<8} {:<20} {:<20}",
        "ID", "NAME", "EXECUTOR", "EXPRESSION", "STATUS", "VERSION", "NEXT RUN (UTC)", "UPDATED (UTC)"
    );
    for job in jobs {
        println!(
            "{:<6} {:<24} {:<10} {:<18} {:<8} {:<8} {:<20} {:<20}",
            job.id,
            job.name,
            job.executor,
            job.expression,
            job.status.to_string(),
            job.version,
            format_millis(job.next_time),
            format_millis(job.utime),
        );
    }
}
