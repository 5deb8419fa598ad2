//! Jobwarden Core - Distributed Job Scheduling
//!
//! This crate provides the scheduling and mutual-exclusion logic shared by
//! every jobwarden worker process:
//! - Scheduler: preemptive, permit-bounded execution of jobs from a shared store
//! - Lease: cluster-wide exclusivity for timer-driven jobs via a lock service
//! - Periodic: timer-driven job runner, optionally lease-guarded
//! - Observability: injected logger + metrics collaborator
//! - Utils: retry policies and in-process metrics
//! - Shutdown: coordinated graceful shutdown

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod lease;
pub mod observability;
pub mod periodic;
pub mod scheduler;
pub mod shutdown;
pub mod utils;

pub use lease::{
    LeaseConfig, LeaseError, LeaseGuard, LeaseResult, LockClient, LockHandle, MemoryLockClient,
    RedisLockClient, TickOutcome,
};
pub use observability::Observability;
pub use periodic::{GuardedJob, JobRunner, PeriodicJob};
pub use scheduler::{
    ExecError, Executor, ExecutorRegistry, Job, JobSchedule, JobStatus, JobStore,
    LocalFuncExecutor, NewJob, PreemptedJob, Scheduler, SchedulerConfig, SchedulerError,
    SchedulerResult, SqliteJobStore,
};
pub use shutdown::{shutdown_on_signal, wait_for_shutdown_signal, ShutdownController, ShutdownPhase};
pub use utils::{MetricsRegistry, RetryPolicy};
