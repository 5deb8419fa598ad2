//! Job storage using SQLite
//!
//! The store is the single source of truth shared by every scheduler
//! process. Preemption is an optimistic compare-and-swap on
//! `(id, version)`; nothing else coordinates competing schedulers.

mod migrations;
mod queries;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::Duration;

use crate::scheduler::types::{Job, Result, SchedulerError};

/// Scheduling operations the engine needs from a job store
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Claim the earliest due waiting job.
    ///
    /// Lost compare-and-swap races are retried internally; the caller only
    /// sees a job, `NoJobAvailable`, or a store error. Bound the call with a
    /// timeout: the retry loop has no iteration cap.
    async fn preempt(&self) -> Result<Job>;

    /// Put a job back to waiting and refresh `utime`. Idempotent.
    async fn release(&self, id: i64) -> Result<()>;

    /// Heartbeat: refresh `utime` only.
    async fn update_utime(&self, id: i64) -> Result<()>;

    /// Record the next eligible run after a successful execution.
    async fn update_next_time(&self, id: i64, next: DateTime<Utc>) -> Result<()>;
}

/// SQLite-based job store
pub struct SqliteJobStore {
    pub(super) pool: Pool<Sqlite>,
}

impl SqliteJobStore {
    /// Create a new store from database path
    pub async fn from_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SchedulerError::InvalidConfig(format!("Failed to create directory: {}", e))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Close the underlying pool
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
