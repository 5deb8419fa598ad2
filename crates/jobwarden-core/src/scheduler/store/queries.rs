use super::{JobStore, SqliteJobStore};
use crate::scheduler::types::{now_millis, Job, JobRow, JobStatus, NewJob, Result, SchedulerError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

const JOB_COLUMNS: &str =
    "id, name, executor, expression, cfg, status, version, next_time, utime, ctime";

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn preempt(&self) -> Result<Job> {
        let select = format!(
            "SELECT {} FROM jobs WHERE status = ? AND next_time <= ? \
             ORDER BY next_time ASC, id ASC LIMIT 1",
            JOB_COLUMNS
        );

        loop {
            let now = now_millis();
            let row: Option<JobRow> = sqlx::query_as(&select)
                .bind(JobStatus::Waiting.as_i64())
                .bind(now)
                .fetch_optional(&self.pool)
                .await?;

            let mut job: Job = match row {
                Some(row) => row.try_into()?,
                None => return Err(SchedulerError::NoJobAvailable),
            };

            let result = sqlx::query(
                r#"
                UPDATE jobs SET status = ?, version = version + 1, utime = ?
                WHERE id = ? AND version = ? AND status = ?
                "#,
            )
            .bind(JobStatus::Running.as_i64())
            .bind(now)
            .bind(job.id)
            .bind(job.version)
            .bind(JobStatus::Waiting.as_i64())
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                debug!(
                    job_id = job.id,
                    version = job.version,
                    "Lost preemption race, rescanning"
                );
                tokio::task::yield_now().await;
                continue;
            }

            job.status = JobStatus::Running;
            job.version += 1;
            job.utime = now;
            return Ok(job);
        }
    }

    async fn release(&self, id: i64) -> Result<()> {
        // A job paused while running stays paused.
        sqlx::query(
            r#"
            UPDATE jobs SET
                status = CASE WHEN status = ? THEN status ELSE ? END,
                utime = ?
            WHERE id = ?
            "#,
        )
        .bind(JobStatus::Paused.as_i64())
        .bind(JobStatus::Waiting.as_i64())
        .bind(now_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_utime(&self, id: i64) -> Result<()> {
        let result = sqlx::query("UPDATE jobs SET utime = ? WHERE id = ?")
            .bind(now_millis())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::JobNotFound(id));
        }

        Ok(())
    }

    async fn update_next_time(&self, id: i64, next: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query("UPDATE jobs SET next_time = ?, utime = ? WHERE id = ?")
            .bind(next.timestamp_millis())
            .bind(now_millis())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::JobNotFound(id));
        }

        Ok(())
    }
}

impl SqliteJobStore {
    /// Insert a new waiting job
    pub async fn create_job(&self, job: &NewJob) -> Result<Job> {
        let now = now_millis();
        let next_time = job.next_time.unwrap_or(now);

        let result = sqlx::query(
            r#"
            INSERT INTO jobs (
                name, executor, expression, cfg, status, version, next_time, utime, ctime
            ) VALUES (?, ?, ?, ?, ?, 1, ?, ?, ?)
            "#,
        )
        .bind(&job.name)
        .bind(&job.executor)
        .bind(&job.expression)
        .bind(&job.cfg)
        .bind(JobStatus::Waiting.as_i64())
        .bind(next_time)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_job(result.last_insert_rowid()).await
    }

    /// Get a job by ID
    pub async fn get_job(&self, id: i64) -> Result<Job> {
        let row: JobRow = sqlx::query_as(&format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(SchedulerError::JobNotFound(id))?;

        row.try_into()
    }

    /// Get a job by its unique name
    pub async fn get_job_by_name(&self, name: &str) -> Result<Option<Job>> {
        let row: Option<JobRow> =
            sqlx::query_as(&format!("SELECT {} FROM jobs WHERE name = ?", JOB_COLUMNS))
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Job::try_from).transpose()
    }

    /// List all jobs ordered by next run
    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {} FROM jobs ORDER BY next_time ASC, id ASC",
            JOB_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    /// Exclude a job from scheduling
    pub async fn pause(&self, id: i64) -> Result<()> {
        let result = sqlx::query("UPDATE jobs SET status = ?, utime = ? WHERE id = ?")
            .bind(JobStatus::Paused.as_i64())
            .bind(now_millis())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::JobNotFound(id));
        }

        Ok(())
    }

    /// Return a paused job to the waiting pool
    pub async fn resume(&self, id: i64) -> Result<()> {
        let result = sqlx::query("UPDATE jobs SET status = ?, utime = ? WHERE id = ? AND status = ?")
            .bind(JobStatus::Waiting.as_i64())
            .bind(now_millis())
            .bind(id)
            .bind(JobStatus::Paused.as_i64())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            // Either missing or not paused; only the former is an error.
            self.get_job(id).await?;
        }

        Ok(())
    }

    /// Running jobs whose heartbeat is older than `cutoff_ms`
    pub async fn list_stale(&self, cutoff_ms: i64) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {} FROM jobs WHERE status = ? AND utime < ? ORDER BY utime ASC",
            JOB_COLUMNS
        ))
        .bind(JobStatus::Running.as_i64())
        .bind(cutoff_ms)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    /// Delete a job
    pub async fn delete_job(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::JobNotFound(id));
        }

        Ok(())
    }
}
