use super::SqliteJobStore;
use crate::scheduler::types::{Result, SchedulerError};

impl SqliteJobStore {
    /// Run database migrations
    pub(super) async fn migrate(&self) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SchedulerError::Transaction(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                executor TEXT NOT NULL,
                expression TEXT NOT NULL,
                cfg TEXT NOT NULL DEFAULT '',
                status INTEGER NOT NULL DEFAULT 0,
                version INTEGER NOT NULL DEFAULT 1,
                next_time INTEGER NOT NULL,
                utime INTEGER NOT NULL,
                ctime INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| SchedulerError::Transaction(format!("Migration failed (jobs): {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_next_time ON jobs(next_time)")
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                SchedulerError::Transaction(format!("Migration failed (idx_jobs_next_time): {}", e))
            })?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_jobs_status_next_time ON jobs(status, next_time)",
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            SchedulerError::Transaction(format!(
                "Migration failed (idx_jobs_status_next_time): {}",
                e
            ))
        })?;

        tx.commit()
            .await
            .map_err(|e| SchedulerError::Transaction(e.to_string()))?;

        Ok(())
    }
}
