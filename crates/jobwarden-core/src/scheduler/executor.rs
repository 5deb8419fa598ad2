//! Executor registry
//!
//! A job names an executor; the scheduler resolves that name here and hands
//! the preempted job over. [`LocalFuncExecutor`] dispatches to in-process
//! functions keyed by job name. Other strategies (remote dispatch, shell)
//! only need to implement [`Executor`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::types::{Job, Result, SchedulerError};

/// Error returned by business functions
pub type ExecError = Box<dyn std::error::Error + Send + Sync>;

/// Future type for local function execution
pub type LocalFuncFuture =
    Pin<Box<dyn Future<Output = std::result::Result<(), ExecError>> + Send>>;

/// Callback type for a registered local function
pub type LocalFunc = Arc<dyn Fn(CancellationToken, Job) -> LocalFuncFuture + Send + Sync>;

/// A named execution strategy
#[async_trait]
pub trait Executor: Send + Sync {
    /// Name jobs use to select this executor
    fn name(&self) -> &str;

    /// Run one preempted job.
    ///
    /// `cancel` fires when the scheduler shuts down; long-running work should
    /// watch it. The scheduler also bounds the call with its execution timeout.
    async fn exec(&self, cancel: CancellationToken, job: &Job) -> Result<()>;

    /// Whether `exec` could run `job` at all. Jobs this rejects are
    /// abandoned by the scheduler instead of dispatched.
    fn can_run(&self, _job: &Job) -> bool {
        true
    }
}

/// Executor that calls functions registered in this process
#[derive(Default)]
pub struct LocalFuncExecutor {
    funcs: HashMap<String, LocalFunc>,
}

impl LocalFuncExecutor {
    /// Executor name used in the `jobs.executor` column
    pub const NAME: &'static str = "local";

    /// Create an executor with no functions
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function for the job with the given name
    pub fn register_fn<F, Fut>(&mut self, job_name: impl Into<String>, f: F)
    where
        F: Fn(CancellationToken, Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), ExecError>> + Send + 'static,
    {
        let func: LocalFunc = Arc::new(move |cancel, job| Box::pin(f(cancel, job)));
        self.funcs.insert(job_name.into(), func);
    }

    /// Builder-style [`register_fn`](Self::register_fn)
    pub fn with_fn<F, Fut>(mut self, job_name: impl Into<String>, f: F) -> Self
    where
        F: Fn(CancellationToken, Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), ExecError>> + Send + 'static,
    {
        self.register_fn(job_name, f);
        self
    }

    /// Whether a function is registered for `job_name`
    pub fn contains(&self, job_name: &str) -> bool {
        self.funcs.contains_key(job_name)
    }
}

#[async_trait]
impl Executor for LocalFuncExecutor {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn can_run(&self, job: &Job) -> bool {
        self.contains(&job.name)
    }

    async fn exec(&self, cancel: CancellationToken, job: &Job) -> Result<()> {
        let func = self
            .funcs
            .get(&job.name)
            .ok_or_else(|| SchedulerError::ExecutorNotFound(format!("local function {}", job.name)))?;

        func(cancel, job.clone())
            .await
            .map_err(|e| SchedulerError::Execution(e.to_string()))
    }
}

/// Executors keyed by name
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor under its own name, replacing any previous one
    pub fn register(&mut self, executor: Arc<dyn Executor>) {
        self.executors
            .insert(executor.name().to_string(), executor);
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, executor: Arc<dyn Executor>) -> Self {
        self.register(executor);
        self
    }

    /// Resolve an executor by name
    pub fn get(&self, name: &str) -> Result<Arc<dyn Executor>> {
        self.executors
            .get(name)
            .cloned()
            .ok_or_else(|| SchedulerError::ExecutorNotFound(name.to_string()))
    }

    /// Resolve the executor for `job`, failing when it is missing or
    /// refuses the job
    pub fn resolve(&self, job: &Job) -> Result<Arc<dyn Executor>> {
        let executor = self.get(&job.executor)?;
        if !executor.can_run(job) {
            return Err(SchedulerError::ExecutorNotFound(format!(
                "{} cannot run {}",
                job.executor, job.name
            )));
        }
        Ok(executor)
    }

    /// Registered executor names
    pub fn names(&self) -> Vec<&str> {
        self.executors.keys().map(String::as_str).collect()
    }

    /// Number of registered executors
    pub fn len(&self) -> usize {
        self.executors.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}
