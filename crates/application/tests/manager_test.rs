use std::sync::Arc;
use std::time::Duration;

use fleet_jobs_application::JobManager;
use fleet_jobs_core::config::AppConfig;
use fleet_jobs_core::models::{DataCleanupData, JobStatus, JobType, ReportGenerationData};
use fleet_jobs_infrastructure::InMemoryJobStore;
use fleet_jobs_testing_utils::{RecordingHandler, ScriptedHandler, TestEnv};

fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.worker.poll_interval_ms = 10;
    config.worker.shutdown_timeout_seconds = 2;
    config.maintenance.recovery_interval_seconds = 1;
    config
}

async fn wait_for_status(manager: &JobManager, id: &str, status: JobStatus) -> bool {
    TestEnv::wait_for(
        || async move {
            matches!(manager.get_job_status(id).await, Ok(job) if job.status == status)
        },
        Duration::from_secs(5),
    )
    .await
}

#[tokio::test]
async fn test_end_to_end_report_execution() {
    let manager = JobManager::new(Arc::new(InMemoryJobStore::new()), fast_config());
    let handler = RecordingHandler::new(JobType::ReportGeneration);
    manager.register_handler(Arc::new(handler.clone())).await;
    manager.start().await.unwrap();

    let job = manager
        .enqueue_report_generation(ReportGenerationData::default(), Some(12))
        .await
        .unwrap();
    assert!(wait_for_status(&manager, &job.id, JobStatus::Completed).await);
    manager.stop().await.unwrap();

    assert_eq!(handler.seen(), vec![job.id.clone()]);
    let history = manager.get_execution_history(10).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].job_id, job.id);
    assert_eq!(history[0].company_id, Some(12));

    let persisted = manager.get_execution_history_from_store(0, 10).await.unwrap();
    assert_eq!(persisted.len(), 1);

    let by_type = manager.get_job_type_metrics().await;
    assert_eq!(by_type[&JobType::ReportGeneration].succeeded, 1);
    assert!(manager
        .export_metrics()
        .await
        .contains("jobs_processed_total 1"));
    assert_eq!(manager.get_pool_stats().await.succeeded, 1);
}

#[tokio::test]
async fn test_caller_handler_overrides_builtin_cleanup() {
    let manager = JobManager::new(Arc::new(InMemoryJobStore::new()), fast_config());
    let failing = Arc::new(ScriptedHandler::always_failing(JobType::DataCleanup));
    manager.register_handler(failing.clone()).await;
    manager.start().await.unwrap();

    let job = manager
        .enqueue_data_cleanup(DataCleanupData::default(), None)
        .await
        .unwrap();
    assert_eq!(job.max_retries, 2);
    assert!(wait_for_status(&manager, &job.id, JobStatus::Failed).await);
    manager.stop().await.unwrap();

    let failed = manager.get_job_status(&job.id).await.unwrap();
    assert_eq!(failed.retry_count, 2);
    assert_eq!(failing.calls(), 2);

    let failures = manager.get_failed_jobs_history(10).await;
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].status, JobStatus::Failed);
    assert_eq!(failures[1].status, JobStatus::Retrying);

    let retried = manager.retry_job(&job.id).await.unwrap();
    assert_eq!(retried.retry_count, 0);
    assert_eq!(retried.status, JobStatus::Pending);
}

#[tokio::test]
async fn test_builtin_cleanup_handler_runs() {
    let manager = JobManager::new(Arc::new(InMemoryJobStore::new()), fast_config());
    manager.start().await.unwrap();

    let job = manager
        .enqueue_data_cleanup(DataCleanupData::default(), None)
        .await
        .unwrap();
    assert!(wait_for_status(&manager, &job.id, JobStatus::Completed).await);
    manager.stop().await.unwrap();

    let done = manager.get_job_status(&job.id).await.unwrap();
    assert_eq!(done.result.unwrap()["retention_days"], 30);
}
