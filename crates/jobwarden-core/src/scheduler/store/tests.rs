    use super::*;
    use crate::scheduler::types::{now_millis, JobStatus, NewJob};
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct TestContext {
        store: Arc<SqliteJobStore>,
        _dir: TempDir,
    }

    async fn create_test_context() -> TestContext {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test_jobs.db");
        let store = Arc::new(SqliteJobStore::from_path(&path).await.unwrap());
        TestContext { store, _dir: dir }
    }

    fn due_job(name: &str) -> NewJob {
        NewJob::new(name, "local", "*/5 * * * * *").with_next_time(now_millis() - 1000)
    }

    #[tokio::test]
    async fn test_create_and_get_job() {
        let ctx = create_test_context().await;

        let created = ctx
            .store
            .create_job(&due_job("ranking").with_cfg(r#"{"top_n":100}"#))
            .await
            .unwrap();

        let job = ctx.store.get_job(created.id).await.unwrap();
        assert_eq!(job.name, "ranking");
        assert_eq!(job.executor, "local");
        assert_eq!(job.cfg, r#"{"top_n":100}"#);
        assert_eq!(job.status, JobStatus::Waiting);
        assert_eq!(job.version, 1);
        assert_eq!(job.ctime, job.utime);

        let by_name = ctx.store.get_job_by_name("ranking").await.unwrap();
        assert_eq!(by_name.map(|j| j.id), Some(created.id));
        assert!(ctx.store.get_job_by_name("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let ctx = create_test_context().await;
        ctx.store.create_job(&due_job("ranking")).await.unwrap();

        let result = ctx.store.create_job(&due_job("ranking")).await;
        assert!(matches!(result, Err(SchedulerError::Database(_))));
    }

    #[tokio::test]
    async fn test_preempt_bumps_version() {
        let ctx = create_test_context().await;
        let created = ctx.store.create_job(&due_job("ranking")).await.unwrap();

        let job = ctx.store.preempt().await.unwrap();
        assert_eq!(job.id, created.id);
        assert_eq!(job.version, 2);
        assert_eq!(job.status, JobStatus::Running);

        let stored = ctx.store.get_job(created.id).await.unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.status, JobStatus::Running);
        assert!(stored.utime >= created.utime);
    }

    #[tokio::test]
    async fn test_preempt_without_due_job() {
        let ctx = create_test_context().await;
        ctx.store
            .create_job(
                &NewJob::new("later", "local", "@daily").with_next_time(now_millis() + 60_000),
            )
            .await
            .unwrap();

        let result = ctx.store.preempt().await;
        assert!(matches!(result, Err(SchedulerError::NoJobAvailable)));
    }

    #[tokio::test]
    async fn test_running_job_not_preempted_twice() {
        let ctx = create_test_context().await;
        ctx.store.create_job(&due_job("ranking")).await.unwrap();

        ctx.store.preempt().await.unwrap();
        let second = ctx.store.preempt().await;
        assert!(matches!(second, Err(SchedulerError::NoJobAvailable)));
    }

    #[tokio::test]
    async fn test_preempt_prefers_earliest_next_time() {
        let ctx = create_test_context().await;
        let now = now_millis();
        ctx.store
            .create_job(&NewJob::new("newer", "local", "@hourly").with_next_time(now - 10))
            .await
            .unwrap();
        let older = ctx
            .store
            .create_job(&NewJob::new("older", "local", "@hourly").with_next_time(now - 5000))
            .await
            .unwrap();

        let job = ctx.store.preempt().await.unwrap();
        assert_eq!(job.id, older.id);
    }

    #[tokio::test]
    async fn test_paused_job_not_eligible() {
        let ctx = create_test_context().await;
        let created = ctx.store.create_job(&due_job("ranking")).await.unwrap();

        ctx.store.pause(created.id).await.unwrap();
        assert!(matches!(
            ctx.store.preempt().await,
            Err(SchedulerError::NoJobAvailable)
        ));

        ctx.store.resume(created.id).await.unwrap();
        let job = ctx.store.preempt().await.unwrap();
        assert_eq!(job.id, created.id);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let ctx = create_test_context().await;
        let created = ctx.store.create_job(&due_job("ranking")).await.unwrap();
        ctx.store.preempt().await.unwrap();

        ctx.store.release(created.id).await.unwrap();
        ctx.store.release(created.id).await.unwrap();

        let job = ctx.store.get_job(created.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Waiting);
        assert_eq!(job.version, 2);
    }

    #[tokio::test]
    async fn test_release_keeps_pause() {
        let ctx = create_test_context().await;
        let created = ctx.store.create_job(&due_job("ranking")).await.unwrap();
        ctx.store.preempt().await.unwrap();

        ctx.store.pause(created.id).await.unwrap();
        ctx.store.release(created.id).await.unwrap();

        let job = ctx.store.get_job(created.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Paused);
    }

    #[tokio::test]
    async fn test_update_next_time() {
        let ctx = create_test_context().await;
        let created = ctx.store.create_job(&due_job("ranking")).await.unwrap();

        let next = chrono::Utc::now() + chrono::Duration::minutes(5);
        ctx.store.update_next_time(created.id, next).await.unwrap();

        let job = ctx.store.get_job(created.id).await.unwrap();
        assert_eq!(job.next_time, next.timestamp_millis());

        let missing = ctx.store.update_next_time(9999, next).await;
        assert!(matches!(missing, Err(SchedulerError::JobNotFound(9999))));
    }

    #[tokio::test]
    async fn test_update_utime() {
        let ctx = create_test_context().await;
        let created = ctx.store.create_job(&due_job("ranking")).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        ctx.store.update_utime(created.id).await.unwrap();

        let job = ctx.store.get_job(created.id).await.unwrap();
        assert!(job.utime > created.utime);
        assert_eq!(job.status, JobStatus::Waiting);

        assert!(matches!(
            ctx.store.update_utime(9999).await,
            Err(SchedulerError::JobNotFound(9999))
        ));
    }

    #[tokio::test]
    async fn test_list_stale() {
        let ctx = create_test_context().await;
        let created = ctx.store.create_job(&due_job("ranking")).await.unwrap();
        ctx.store.create_job(&due_job("idle")).await.unwrap();

        let job = ctx.store.preempt().await.unwrap();
        assert_eq!(job.id, created.id);

        assert!(ctx.store.list_stale(job.utime).await.unwrap().is_empty());

        let stale = ctx.store.list_stale(job.utime + 1).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, created.id);
    }

    #[tokio::test]
    async fn test_delete_job() {
        let ctx = create_test_context().await;
        let created = ctx.store.create_job(&due_job("ranking")).await.unwrap();

        ctx.store.delete_job(created.id).await.unwrap();
        assert!(matches!(
            ctx.store.get_job(created.id).await,
            Err(SchedulerError::JobNotFound(_))
        ));
        assert!(ctx.store.list_jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_preempt_single_job() {
        let ctx = create_test_context().await;
        let created = ctx.store.create_job(&due_job("ranking")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = ctx.store.clone();
            handles.push(tokio::spawn(async move { store.preempt().await }));
        }

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(job) => {
                    assert_eq!(job.id, created.id);
                    assert_eq!(job.version, 2);
                    winners += 1;
                }
                Err(e) => assert!(e.is_no_job(), "unexpected error: {}", e),
            }
        }

        assert_eq!(winners, 1);
        let job = ctx.store.get_job(created.id).await.unwrap();
        assert_eq!(job.version, 2);
    }

    #[tokio::test]
    async fn test_concurrent_preempt_many_jobs() {
        let ctx = create_test_context().await;
        for i in 0..6 {
            ctx.store
                .create_job(&due_job(&format!("job-{}", i)))
                .await
                .unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = ctx.store.clone();
            handles.push(tokio::spawn(async move {
                let mut won = Vec::new();
                loop {
                    match store.preempt().await {
                        Ok(job) => won.push(job),
                        Err(SchedulerError::NoJobAvailable) => break,
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
                won
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for job in handle.await.unwrap() {
                assert_eq!(job.version, 2);
                assert!(seen.insert(job.id), "job {} preempted twice", job.id);
            }
        }
        assert_eq!(seen.len(), 6);

        for job in ctx.store.list_jobs().await.unwrap() {
            assert_eq!(job.status, JobStatus::Running);
            assert_eq!(job.version, 2);
        }
    }
