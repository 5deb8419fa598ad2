//! Preemptive job scheduler
//!
//! Any number of scheduler processes share one job table. Each process
//! runs a [`Scheduler`] loop that claims due jobs with an optimistic
//! compare-and-swap on `(id, version)`, so a given job version runs on
//! exactly one process.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │    Scheduler    │  Permit-bounded polling loop
//! └────────┬────────┘
//!          │ preempt / release / heartbeat
//!          ▼
//! ┌─────────────────┐
//! │    JobStore     │  SQLite, CAS on version
//! └────────┬────────┘
//!          │ dispatch by executor name
//!          ▼
//! ┌─────────────────┐
//! │ExecutorRegistry │  LocalFuncExecutor, ...
//! └─────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use jobwarden_core::scheduler::{
//!     ExecutorRegistry, LocalFuncExecutor, NewJob, Scheduler, SchedulerConfig, SqliteJobStore,
//! };
//!
//! let store = Arc::new(SqliteJobStore::from_path(&db_path).await?);
//! store.create_job(&NewJob::new("ranking", "local", "*/5 * * * *")).await?;
//!
//! let local = LocalFuncExecutor::new().with_fn("ranking", |cancel, job| async move {
//!     compute_ranking(cancel, &job.cfg).await
//! });
//! let registry = ExecutorRegistry::new().with(Arc::new(local));
//!
//! let scheduler = Scheduler::new(store, registry, SchedulerConfig::new())?;
//! scheduler.start(shutdown_token).await?;
//! ```

mod config;
mod engine;
mod executor;
mod handle;
mod schedule;
mod store;
mod types;

pub use config::SchedulerConfig;
pub use engine::Scheduler;
pub use executor::{
    ExecError, Executor, ExecutorRegistry, LocalFunc, LocalFuncExecutor, LocalFuncFuture,
};
pub use handle::{Heartbeat, PreemptedJob};
pub use schedule::{validate_expression, JobSchedule};
pub use store::{JobStore, SqliteJobStore};
pub use types::{now_millis, Job, JobStatus, NewJob, Result as SchedulerResult, SchedulerError};
