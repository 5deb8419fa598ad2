    use super::*;
    use crate::scheduler::store::SqliteJobStore;
    use crate::scheduler::types::{now_millis, JobStatus, NewJob};
    use tempfile::TempDir;

    struct TestContext {
        store: Arc<SqliteJobStore>,
        _dir: TempDir,
    }

    async fn create_test_context() -> TestContext {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(
            SqliteJobStore::from_path(&dir.path().join("handle.db"))
                .await
                .unwrap(),
        );
        store
            .create_job(&NewJob::new("ranking", "local", "@hourly").with_next_time(now_millis() - 1))
            .await
            .unwrap();
        TestContext { store, _dir: dir }
    }

    fn fast_config() -> SchedulerConfig {
        SchedulerConfig::new()
            .with_heartbeat_interval(Duration::from_millis(20))
            .with_db_timeout(Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_heartbeat_refreshes_utime_until_release() {
        let ctx = create_test_context().await;
        let job = ctx.store.preempt().await.unwrap();
        let preempted_at = job.utime;

        let handle = PreemptedJob::start(job, ctx.store.clone(), &fast_config());
        tokio::time::sleep(Duration::from_millis(120)).await;

        let during = ctx.store.get_job(handle.job().id).await.unwrap();
        assert_eq!(during.status, JobStatus::Running);
        assert!(during.utime > preempted_at);

        handle.release().await.unwrap();
        let released = ctx.store.get_job(during.id).await.unwrap();
        assert_eq!(released.status, JobStatus::Waiting);

        tokio::time::sleep(Duration::from_millis(80)).await;
        let later = ctx.store.get_job(during.id).await.unwrap();
        assert_eq!(later.utime, released.utime);
    }

    #[tokio::test]
    async fn test_drop_without_release_frees_job() {
        let ctx = create_test_context().await;
        let job = ctx.store.preempt().await.unwrap();
        let id = job.id;

        let handle = PreemptedJob::start(job, ctx.store.clone(), &fast_config());
        drop(handle);

        let mut status = JobStatus::Running;
        for _ in 0..50 {
            status = ctx.store.get_job(id).await.unwrap().status;
            if status == JobStatus::Waiting {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(status, JobStatus::Waiting);
    }

    #[tokio::test]
    async fn test_heartbeat_stop_is_prompt() {
        let ctx = create_test_context().await;
        let heartbeat = Heartbeat::start(
            ctx.store.clone(),
            1,
            Duration::from_secs(3600),
            Duration::from_secs(1),
        );

        let stopped = tokio::time::timeout(Duration::from_secs(1), heartbeat.stop()).await;
        assert!(stopped.is_ok());
    }
