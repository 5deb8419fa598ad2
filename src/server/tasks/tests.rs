    use super::*;
    use jobwarden_core::scheduler::{Executor, JobStore, NewJob};
    use tempfile::TempDir;

    async fn store_with_running_job(dir: &TempDir) -> (Arc<SqliteJobStore>, Job) {
        let store = Arc::new(
            SqliteJobStore::from_path(&dir.path().join("jobs.db"))
                .await
                .unwrap(),
        );
        store
            .create_job(&NewJob::new(STALE_REPORT, "local", "@hourly").with_next_time(now_millis() - 1000))
            .await
            .unwrap();
        let job = store.preempt().await.unwrap();
        (store, job)
    }

    #[tokio::test]
    async fn test_report_finds_silent_running_job() {
        let dir = TempDir::new().unwrap();
        let (store, job) = store_with_running_job(&dir).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let stale = StaleReport::new(store.clone(), Duration::ZERO).report().await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, job.id);

        let fresh = StaleReport::new(store, Duration::from_secs(3600)).report().await.unwrap();
        assert!(fresh.is_empty());
    }

    #[tokio::test]
    async fn test_report_runs_as_local_function() {
        let dir = TempDir::new().unwrap();
        let (store, job) = store_with_running_job(&dir).await;

        let mut local = LocalFuncExecutor::new();
        StaleReport::new(store, Duration::from_secs(3600)).register(&mut local);
        assert!(local.contains(STALE_REPORT));

        local.exec(CancellationToken::new(), &job).await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_report_fails() {
        let dir = TempDir::new().unwrap();
        let (store, _) = store_with_running_job(&dir).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = StaleReport::new(store, Duration::ZERO);
        assert_eq!(report.name(), STALE_REPORT);
        assert!(report.run(cancel).await.is_err());
    }
