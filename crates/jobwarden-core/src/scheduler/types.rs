//! Scheduler job types and error definitions
//!
//! Contains the persisted job model and the error taxonomy shared by the
//! store, the executors and the scheduling loop.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::schedule::JobSchedule;

/// Result type for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Scheduler error types
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Migration or transaction error
    #[error("transaction error: {0}")]
    Transaction(String),
    /// No waiting job is due right now
    #[error("no job available")]
    NoJobAvailable,
    /// Job not found
    #[error("job not found: {0}")]
    JobNotFound(i64),
    /// The job names an executor nobody registered
    #[error("executor not found: {0}")]
    ExecutorNotFound(String),
    /// The executor ran and reported a failure
    #[error("execution error: {0}")]
    Execution(String),
    /// Schedule expression could not be parsed or has no next instant
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A bounded operation ran out of time
    #[error("{0} timed out")]
    Timeout(&'static str),
    /// The scheduling loop was cancelled
    #[error("scheduler cancelled")]
    Cancelled,
}

impl SchedulerError {
    /// Whether the error is an expected, non-fatal outcome of a scan
    pub fn is_no_job(&self) -> bool {
        matches!(self, SchedulerError::NoJobAvailable)
    }
}

/// Lifecycle state of a persisted job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Free to be preempted once `next_time` has passed
    Waiting = 0,
    /// Held by a scheduler instance
    Running = 1,
    /// Excluded from scheduling
    Paused = 2,
}

impl JobStatus {
    /// Column value stored in the database
    pub fn as_i64(self) -> i64 {
        self as i64
    }
}

impl TryFrom<i64> for JobStatus {
    type Error = SchedulerError;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            0 => Ok(JobStatus::Waiting),
            1 => Ok(JobStatus::Running),
            2 => Ok(JobStatus::Paused),
            other => Err(SchedulerError::InvalidConfig(format!(
                "unknown job status: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

/// Persisted job record
///
/// Timestamps are epoch milliseconds. `version` is bumped by every
/// successful preemption and is the only thing two schedulers race on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Primary key
    pub id: i64,
    /// Unique human identifier
    pub name: String,
    /// Key into the executor registry
    pub executor: String,
    /// Schedule expression (cron)
    pub expression: String,
    /// Opaque configuration handed to the executor
    pub cfg: String,
    /// Current lifecycle state
    pub status: JobStatus,
    /// Optimistic concurrency counter
    pub version: i64,
    /// Earliest eligible run
    pub next_time: i64,
    /// Last heartbeat / modification
    pub utime: i64,
    /// Creation time
    pub ctime: i64,
}

impl Job {
    /// Eligible for preemption at `now_ms`
    pub fn is_due(&self, now_ms: i64) -> bool {
        self.status == JobStatus::Waiting && self.next_time <= now_ms
    }

    /// Next occurrence of this job's schedule after `from`
    pub fn next_time_after(&self, from: chrono::DateTime<Utc>) -> Result<chrono::DateTime<Utc>> {
        JobSchedule::parse(&self.expression)?.next_after(from)
    }
}

/// Input for inserting a new job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    /// Unique human identifier
    pub name: String,
    /// Key into the executor registry
    pub executor: String,
    /// Schedule expression (cron)
    pub expression: String,
    /// Opaque configuration handed to the executor
    pub cfg: String,
    /// First eligible run; `None` means immediately
    pub next_time: Option<i64>,
}

impl NewJob {
    /// Create a job definition with an empty config
    pub fn new(
        name: impl Into<String>,
        executor: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            executor: executor.into(),
            expression: expression.into(),
            cfg: String::new(),
            next_time: None,
        }
    }

    /// Set the executor configuration
    pub fn with_cfg(mut self, cfg: impl Into<String>) -> Self {
        self.cfg = cfg.into();
        self
    }

    /// Set the first eligible run (epoch ms)
    pub fn with_next_time(mut self, next_time: i64) -> Self {
        self.next_time = Some(next_time);
        self
    }
}

/// Internal row type for database queries
#[derive(FromRow)]
pub(super) struct JobRow {
    pub id: i64,
    pub name: String,
    pub executor: String,
    pub expression: String,
    pub cfg: String,
    pub status: i64,
    pub version: i64,
    pub next_time: i64,
    pub utime: i64,
    pub ctime: i64,
}

impl TryFrom<JobRow> for Job {
    type Error = SchedulerError;

    fn try_from(row: JobRow) -> Result<Self> {
        Ok(Job {
            id: row.id,
            name: row.name,
            executor: row.executor,
            expression: row.expression,
            cfg: row.cfg,
            status: JobStatus::try_from(row.status)?,
            version: row.version,
            next_time: row.next_time,
            utime: row.utime,
            ctime: row.ctime,
        })
    }
}

/// Current wall-clock time in epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
