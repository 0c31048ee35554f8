use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fleet_jobs_core::models::{JobStatus, JobType};
use fleet_jobs_core::traits::JobStore;
use fleet_jobs_infrastructure::{InMemoryJobStore, JobMetricsCollector, JobQueue};
use fleet_jobs_testing_utils::{JobBuilder, RecordingHandler, ScriptedHandler, SlowHandler, TestEnv};
use fleet_jobs_worker::{HandlerRegistry, WorkerPool};

fn queue() -> JobQueue {
    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    JobQueue::new(store, "worker_it_queue", Duration::from_secs(3600))
}

async fn wait_for_completed(queue: &JobQueue, expected: u64, timeout: Duration) -> bool {
    TestEnv::wait_for(
        || {
            let queue = queue.clone();
            async move {
                queue
                    .get_queue_stats()
                    .await
                    .map(|s| s.completed >= expected)
                    .unwrap_or(false)
            }
        },
        timeout,
    )
    .await
}

#[tokio::test]
async fn test_fifteen_jobs_with_five_workers() {
    let queue = queue();
    let registry = Arc::new(HandlerRegistry::new());
    let handler = RecordingHandler::new(JobType::Notification).with_delay(Duration::from_millis(50));
    registry.register(Arc::new(handler.clone())).await;

    let metrics = Arc::new(JobMetricsCollector::in_memory(Default::default()));
    let pool = WorkerPool::builder(queue.clone(), registry)
        .concurrency(5)
        .poll_interval(Duration::from_millis(10))
        .metrics(metrics.clone())
        .build();

    let mut ids = HashSet::new();
    for _ in 0..15 {
        ids.insert(queue.enqueue(JobBuilder::notification().build()).await.unwrap().id);
    }

    pool.start().await.unwrap();
    assert!(wait_for_completed(&queue, 15, Duration::from_secs(5)).await);
    pool.stop().await.unwrap();

    let seen = handler.seen();
    assert_eq!(seen.len(), 15);
    assert_eq!(seen.iter().cloned().collect::<HashSet<_>>(), ids);
    // 并行执行且不超过并发上限
    let peak = handler.peak_concurrency();
    assert!(peak > 1 && peak <= 5, "peak concurrency {peak}");

    let stats = pool.stats().await;
    assert_eq!(stats.processed, 15);
    assert_eq!(stats.succeeded, 15);
    assert!(stats.min_duration_ms.unwrap() >= 50);
    assert_eq!(metrics.metrics().await.succeeded, 15);

    let queue_stats = queue.get_queue_stats().await.unwrap();
    assert_eq!(queue_stats.pending, 0);
    assert_eq!(queue_stats.processing, 0);
}

#[tokio::test]
async fn test_cleanup_job_failing_twice_ends_failed() {
    let queue = queue();
    let registry = Arc::new(HandlerRegistry::new());
    let handler = Arc::new(ScriptedHandler::always_failing(JobType::DataCleanup));
    registry.register(handler.clone()).await;

    let pool = WorkerPool::builder(queue.clone(), registry)
        .concurrency(1)
        .poll_interval(Duration::from_millis(20))
        .build();
    let job = queue
        .enqueue(JobBuilder::data_cleanup().with_max_retries(2).build())
        .await
        .unwrap();

    pool.start().await.unwrap();
    let failed = TestEnv::wait_for(
        || {
            let queue = queue.clone();
            let id = job.id.clone();
            async move {
                matches!(
                    queue.get_job(&id).await,
                    Ok(Some(job)) if job.status == JobStatus::Failed
                )
            }
        },
        Duration::from_secs(5),
    )
    .await;
    pool.stop().await.unwrap();
    assert!(failed);

    let stored = queue.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.retry_count, 2);
    assert!(stored.completed_at.is_some());
    assert!(stored.error.unwrap().contains("scripted failure 2"));
    assert_eq!(handler.calls(), 2);
}

#[tokio::test]
async fn test_stop_waits_for_in_flight_jobs() {
    let queue = queue();
    let registry = Arc::new(HandlerRegistry::new());
    let slow = SlowHandler::new(JobType::ReportGeneration, Duration::from_millis(150));
    let finished = slow.finished();
    registry.register(Arc::new(slow)).await;

    let pool = WorkerPool::builder(queue.clone(), registry)
        .poll_interval(Duration::from_millis(10))
        .shutdown_timeout(Duration::from_secs(2))
        .build();
    let job = queue.enqueue(JobBuilder::report().build()).await.unwrap();

    pool.start().await.unwrap();
    assert!(
        TestEnv::wait_for(
            || {
                let queue = queue.clone();
                async move { queue.get_queue_stats().await.map(|s| s.processing == 1).unwrap_or(false) }
            },
            Duration::from_secs(2),
        )
        .await
    );
    pool.stop().await.unwrap();

    assert_eq!(finished.load(Ordering::SeqCst), 1);
    assert_eq!(
        queue.get_job(&job.id).await.unwrap().unwrap().status,
        JobStatus::Completed
    );
}

#[tokio::test]
async fn test_stop_aborts_stragglers_after_timeout() {
    let queue = queue();
    let registry = Arc::new(HandlerRegistry::new());
    let slow = SlowHandler::new(JobType::ReportGeneration, Duration::from_secs(10));
    let finished = slow.finished();
    registry.register(Arc::new(slow)).await;

    let pool = WorkerPool::builder(queue.clone(), registry)
        .poll_interval(Duration::from_millis(10))
        .shutdown_timeout(Duration::from_millis(100))
        .build();
    let job = queue.enqueue(JobBuilder::report().build()).await.unwrap();

    pool.start().await.unwrap();
    assert!(
        TestEnv::wait_for(
            || {
                let queue = queue.clone();
                async move { queue.get_queue_stats().await.map(|s| s.processing == 1).unwrap_or(false) }
            },
            Duration::from_secs(2),
        )
        .await
    );

    let stopping = Instant::now();
    pool.stop().await.unwrap();
    assert!(stopping.elapsed() < Duration::from_secs(2));
    assert!(!pool.is_running().await);

    // 租约保留，等待回收
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(finished.load(Ordering::SeqCst), 0);
    assert_eq!(
        queue.get_job(&job.id).await.unwrap().unwrap().status,
        JobStatus::Processing
    );
}
