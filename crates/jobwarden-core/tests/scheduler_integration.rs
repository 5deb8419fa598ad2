//! Multi-process scheduling scenarios
//!
//! Each "process" is a separate `SqliteJobStore` pool plus `Scheduler` over
//! the same database file.

use jobwarden_core::scheduler::{
    now_millis, ExecError, ExecutorRegistry, JobStatus, LocalFuncExecutor, NewJob, Scheduler,
    SchedulerConfig, SchedulerError, SqliteJobStore,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

type RunLog = Arc<Mutex<Vec<(usize, String)>>>;

fn build_registry(process: usize, names: &[String], log: &RunLog) -> ExecutorRegistry {
    let mut local = LocalFuncExecutor::new();
    for name in names {
        let log = log.clone();
        local.register_fn(name.clone(), move |_cancel, job| {
            let log = log.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                log.lock().unwrap().push((process, job.name.clone()));
                Ok::<(), ExecError>(())
            }
        });
    }
    ExecutorRegistry::new().with(Arc::new(local))
}

async fn open_process(
    path: &Path,
    process: usize,
    names: &[String],
    log: &RunLog,
) -> (Arc<SqliteJobStore>, Arc<Scheduler>) {
    let store = Arc::new(SqliteJobStore::from_path(path).await.unwrap());
    let config = SchedulerConfig::new()
        .with_max_concurrent(3)
        .with_idle_backoff(Duration::from_millis(10));
    let scheduler =
        Arc::new(Scheduler::new(store.clone(), build_registry(process, names, log), config).unwrap());
    (store, scheduler)
}

#[tokio::test]
async fn test_competing_schedulers_run_each_job_once() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("jobs.db");
    let names: Vec<String> = (0..10).map(|i| format!("job-{}", i)).collect();
    let log: RunLog = Arc::new(Mutex::new(Vec::new()));

    let (admin, first) = open_process(&path, 1, &names, &log).await;
    let (_second_store, second) = open_process(&path, 2, &names, &log).await;

    let before = now_millis();
    for name in &names {
        admin
            .create_job(&NewJob::new(name.clone(), "local", "0 0 * * * *").with_next_time(before - 1000))
            .await
            .unwrap();
    }

    let cancel = CancellationToken::new();
    let tasks = [first.clone(), second.clone()].map(|scheduler| {
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.start(cancel).await })
    });

    let mut done = false;
    for _ in 0..500 {
        let jobs = admin.list_jobs().await.unwrap();
        if jobs
            .iter()
            .all(|j| j.status == JobStatus::Waiting && j.next_time > before)
        {
            done = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(done, "not every job completed");

    cancel.cancel();
    for task in tasks {
        let result = task.await.unwrap();
        assert!(matches!(result, Err(SchedulerError::Cancelled)));
    }
    assert!(first.drain(Duration::from_secs(1)).await);
    assert!(second.drain(Duration::from_secs(1)).await);

    let mut runs: HashMap<String, usize> = HashMap::new();
    for (_, name) in log.lock().unwrap().iter() {
        *runs.entry(name.clone()).or_default() += 1;
    }
    assert_eq!(runs.len(), names.len());
    assert!(runs.values().all(|&n| n == 1), "duplicate runs: {:?}", runs);

    for job in admin.list_jobs().await.unwrap() {
        assert_eq!(job.version, 2);
    }
}

#[tokio::test]
async fn test_paused_job_is_never_dispatched() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("jobs.db");
    let names = vec!["ranking".to_string()];
    let log: RunLog = Arc::new(Mutex::new(Vec::new()));

    let (store, scheduler) = open_process(&path, 1, &names, &log).await;
    let job = store
        .create_job(&NewJob::new("ranking", "local", "@hourly").with_next_time(now_millis() - 1000))
        .await
        .unwrap();
    store.pause(job.id).await.unwrap();

    let cancel = CancellationToken::new();
    let task = {
        let scheduler = scheduler.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.start(cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(log.lock().unwrap().is_empty());

    store.resume(job.id).await.unwrap();
    for _ in 0..200 {
        if !log.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(log.lock().unwrap().len(), 1);

    cancel.cancel();
    let _ = task.await.unwrap();
}
