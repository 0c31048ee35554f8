use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use tracing::{info, warn};

use fleet_jobs_core::config::AppConfig;
use fleet_jobs_core::models::{
    AnalyticsAggregationData, DataCleanupData, ExecutionRecord, FailureAlert,
    InvoiceGenerationData, Job, JobMetrics, JobPayload, JobPriority, JobStatus, JobType,
    JobTypeMetrics, NotificationData, PurgeStats, QueueStats, ReportGenerationData, ScheduledJob,
};
use fleet_jobs_core::traits::{JobHandler, JobStore, TypedHandler, TypedJobHandler};
use fleet_jobs_core::{JobError, JobResult};
use fleet_jobs_dispatcher::{Claim, Deduplicator, JobScheduler, PriorityAdjuster, Purger, RecoveryService};
use fleet_jobs_infrastructure::{JobMetricsCollector, JobQueue, StructuredLogger};
use fleet_jobs_worker::{
    DataCleanupHandler, HandlerRegistry, NotificationHandler, PoolStats, WorkerPool,
};

/// 任务系统管理器
///
/// 持有所有组件，负责启动顺序、去重入队以及查询与管理操作。
pub struct JobManager {
    config: AppConfig,
    queue: JobQueue,
    registry: Arc<HandlerRegistry>,
    pool: WorkerPool,
    scheduler: Arc<JobScheduler>,
    recovery: Arc<RecoveryService>,
    deduplicator: Option<Deduplicator>,
    adjuster: PriorityAdjuster,
    purger: Purger,
    metrics: Arc<JobMetricsCollector>,
    is_running: RwLock<bool>,
}

impl JobManager {
    pub fn new(store: Arc<dyn JobStore>, config: AppConfig) -> Self {
        let queue = JobQueue::new(Arc::clone(&store), &config.queue.name, config.queue.job_ttl());
        let metrics = Arc::new(JobMetricsCollector::new(
            Arc::clone(&store),
            config.metrics.clone(),
        ));
        let registry = Arc::new(HandlerRegistry::new());

        let pool = WorkerPool::builder(queue.clone(), Arc::clone(&registry))
            .config(&config.worker)
            .metrics(Arc::clone(&metrics))
            .build();
        let scheduler = Arc::new(
            JobScheduler::new(queue.clone(), config.scheduler.tick_interval())
                .with_shutdown_timeout(config.scheduler.shutdown_timeout())
                .with_metrics(Arc::clone(&metrics)),
        );
        let recovery = Arc::new(
            RecoveryService::new(
                queue.clone(),
                config.maintenance.clone(),
                config.queue.visibility_timeout(),
            )
            .with_metrics(Arc::clone(&metrics)),
        );
        let deduplicator = config.dedup.enabled.then(|| {
            Deduplicator::new(
                Arc::clone(&store),
                config.dedup.key_prefix.clone(),
                config.dedup.window(),
            )
        });

        Self {
            adjuster: PriorityAdjuster::new(queue.clone()),
            purger: Purger::new(queue.clone()),
            config,
            queue,
            registry,
            pool,
            scheduler,
            recovery,
            deduplicator,
            metrics,
            is_running: RwLock::new(false),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub fn metrics_collector(&self) -> Arc<JobMetricsCollector> {
        Arc::clone(&self.metrics)
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// 注册任务处理器，覆盖同类型的已有处理器
    pub async fn register_handler(&self, handler: Arc<dyn JobHandler>) {
        self.registry.register(handler).await;
    }

    pub async fn register_typed_handler<H: TypedJobHandler>(&self, handler: H) {
        self.register_handler(Arc::new(TypedHandler::new(handler)))
            .await;
    }

    /// 启动工作池、调度器与维护服务
    pub async fn start(&self) -> JobResult<()> {
        let mut is_running = self.is_running.write().await;
        if *is_running {
            return Err(JobError::AlreadyRunning("job manager"));
        }

        self.registry
            .register_if_absent(Arc::new(TypedHandler::new(DataCleanupHandler::new(
                self.queue.clone(),
            ))))
            .await;
        self.registry
            .register_if_absent(Arc::new(TypedHandler::new(NotificationHandler)))
            .await;

        if self.config.scheduler.enabled {
            self.scheduler.load_from_store().await?;
            if self.config.scheduler.install_defaults {
                let installed = self.scheduler.install_defaults().await?;
                if installed > 0 {
                    info!("安装默认定时任务 {} 个", installed);
                }
            }
        }

        self.pool.start().await?;
        if self.config.scheduler.enabled {
            self.scheduler.start().await?;
        }
        if self.config.maintenance.enabled {
            self.recovery.start().await?;
        }

        *is_running = true;
        info!(
            "任务管理器启动: 队列 {}, 处理器 {:?}",
            self.queue.name(),
            self.registry.job_types().await
        );
        Ok(())
    }

    /// 依次停止调度器、工作池和维护服务
    pub async fn stop(&self) -> JobResult<()> {
        let mut is_running = self.is_running.write().await;
        if !*is_running {
            return Err(JobError::NotRunning("job manager"));
        }

        self.scheduler.stop().await?;
        self.pool.stop().await?;
        self.recovery.stop().await?;

        *is_running = false;
        info!("任务管理器已停止");
        Ok(())
    }

    /// 提交任务
    ///
    /// 去重窗口内的相同任务被拒绝；去重检查本身失败时放行。
    pub async fn enqueue_job(&self, job: Job) -> JobResult<Job> {
        let mut claimed = None;
        if let Some(dedup) = &self.deduplicator {
            match dedup.try_claim(&job).await {
                Ok(Claim::Acquired(fingerprint)) => claimed = Some(fingerprint),
                Ok(Claim::Duplicate(fingerprint)) => {
                    StructuredLogger::log_duplicate_rejected(&job, &fingerprint);
                    return Err(JobError::DuplicateJob { fingerprint });
                }
                Err(e) => warn!("去重检查失败，继续入队: {}", e),
            }
        }

        let job = match self.queue.enqueue(job).await {
            Ok(job) => job,
            Err(e) => {
                if let (Some(dedup), Some(fingerprint)) = (&self.deduplicator, claimed) {
                    if let Err(release_err) = dedup.release(&fingerprint).await {
                        warn!("释放任务指纹失败: {} - {}", fingerprint, release_err);
                    }
                }
                return Err(e);
            }
        };
        self.metrics.record_enqueued(job.job_type()).await;
        Ok(job)
    }

    async fn enqueue_with_defaults(
        &self,
        payload: JobPayload,
        priority: JobPriority,
        max_retries: u32,
        company_id: Option<i64>,
    ) -> JobResult<Job> {
        let mut job = Job::new(payload)
            .with_priority(priority)
            .with_max_retries(max_retries);
        job.company_id = company_id;
        self.enqueue_job(job).await
    }

    pub async fn enqueue_report_generation(
        &self,
        data: ReportGenerationData,
        company_id: Option<i64>,
    ) -> JobResult<Job> {
        self.enqueue_with_defaults(
            JobPayload::ReportGeneration(data),
            JobPriority::NORMAL,
            3,
            company_id,
        )
        .await
    }

    pub async fn enqueue_invoice_generation(
        &self,
        data: InvoiceGenerationData,
        company_id: Option<i64>,
    ) -> JobResult<Job> {
        self.enqueue_with_defaults(
            JobPayload::InvoiceGeneration(data),
            JobPriority::HIGH,
            3,
            company_id,
        )
        .await
    }

    pub async fn enqueue_data_cleanup(
        &self,
        data: DataCleanupData,
        company_id: Option<i64>,
    ) -> JobResult<Job> {
        self.enqueue_with_defaults(JobPayload::DataCleanup(data), JobPriority::LOW, 2, company_id)
            .await
    }

    pub async fn enqueue_notification(
        &self,
        data: NotificationData,
        company_id: Option<i64>,
    ) -> JobResult<Job> {
        self.enqueue_with_defaults(
            JobPayload::Notification(data),
            JobPriority::HIGH,
            5,
            company_id,
        )
        .await
    }

    pub async fn enqueue_analytics_aggregation(
        &self,
        data: AnalyticsAggregationData,
        company_id: Option<i64>,
    ) -> JobResult<Job> {
        self.enqueue_with_defaults(
            JobPayload::AnalyticsAggregation(data),
            JobPriority::LOW,
            3,
            company_id,
        )
        .await
    }

    pub async fn get_job_status(&self, id: &str) -> JobResult<Job> {
        self.queue
            .get_job(id)
            .await?
            .ok_or_else(|| JobError::JobNotFound { id: id.to_string() })
    }

    pub async fn get_jobs_by_status(&self, status: JobStatus, limit: usize) -> JobResult<Vec<Job>> {
        self.queue.get_jobs_by_status(status, limit).await
    }

    pub async fn get_queue_stats(&self) -> JobResult<QueueStats> {
        let stats = self.queue.get_queue_stats().await?;
        self.metrics.update_queue_gauges(&stats).await;
        Ok(stats)
    }

    /// 汇总指标，队列深度在读取前刷新；存储不可用时沿用上次的值
    pub async fn get_metrics(&self) -> JobMetrics {
        if let Err(e) = self.get_queue_stats().await {
            warn!("刷新队列深度失败: {}", e);
        }
        self.metrics.metrics().await
    }

    pub async fn get_job_type_metrics(&self) -> BTreeMap<JobType, JobTypeMetrics> {
        self.metrics.job_type_metrics().await
    }

    pub async fn get_pool_stats(&self) -> PoolStats {
        self.pool.stats().await
    }

    pub async fn get_execution_history(&self, limit: usize) -> Vec<ExecutionRecord> {
        self.metrics.execution_history(limit).await
    }

    pub async fn get_execution_history_from_store(
        &self,
        offset: usize,
        limit: usize,
    ) -> JobResult<Vec<ExecutionRecord>> {
        self.metrics.history_from_store(offset, limit).await
    }

    pub async fn get_failed_jobs_history(&self, limit: usize) -> Vec<ExecutionRecord> {
        self.metrics.failed_history(limit).await
    }

    pub async fn get_failure_alerts(&self) -> Vec<FailureAlert> {
        if let Err(e) = self.get_queue_stats().await {
            warn!("刷新队列深度失败: {}", e);
        }
        self.metrics.failure_alerts().await
    }

    pub async fn export_metrics(&self) -> String {
        if let Err(e) = self.get_queue_stats().await {
            warn!("刷新队列深度失败: {}", e);
        }
        self.metrics.export_text().await
    }

    pub async fn reset_metrics(&self) {
        self.metrics.reset().await;
        info!("任务指标已重置");
    }

    pub async fn cancel_job(&self, id: &str) -> JobResult<Job> {
        let job = self.queue.cancel(id).await?;
        self.metrics.record_cancelled(job.job_type()).await;
        Ok(job)
    }

    /// 人工重试：重置重试计数并立即放回队列
    pub async fn retry_job(&self, id: &str) -> JobResult<Job> {
        self.queue.requeue(id).await
    }

    pub async fn adjust_job_priorities(&self) -> JobResult<usize> {
        self.adjuster.adjust_all_priorities(Utc::now()).await
    }

    pub async fn purge_completed_jobs(&self, older_than: Duration) -> JobResult<u64> {
        self.purger.purge_completed(older_than).await
    }

    pub async fn purge_failed_jobs(&self, older_than: Duration) -> JobResult<u64> {
        self.purger.purge_failed(older_than).await
    }

    pub async fn purge_cancelled_jobs(&self, older_than: Duration) -> JobResult<u64> {
        self.purger.purge_cancelled(older_than).await
    }

    pub async fn get_purge_stats(&self, older_than: Duration) -> JobResult<PurgeStats> {
        self.purger.get_purge_stats(older_than).await
    }

    /// 去重关闭时总是返回 `false`
    pub async fn check_duplicate(&self, job: &Job) -> JobResult<bool> {
        match &self.deduplicator {
            Some(dedup) => dedup.is_duplicate(job).await,
            None => Ok(false),
        }
    }

    pub async fn register_scheduled_job(&self, template: ScheduledJob) -> JobResult<ScheduledJob> {
        self.scheduler.register(template).await
    }

    pub async fn unregister_scheduled_job(&self, id: &str) -> JobResult<()> {
        self.scheduler.unregister(id).await
    }

    pub async fn set_scheduled_job_active(&self, id: &str, active: bool) -> JobResult<ScheduledJob> {
        self.scheduler.set_active(id, active).await
    }

    pub async fn list_scheduled_jobs(&self) -> Vec<ScheduledJob> {
        self.scheduler.list().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_jobs_infrastructure::InMemoryJobStore;
    use fleet_jobs_testing_utils::JobBuilder;

    fn manager() -> JobManager {
        JobManager::new(Arc::new(InMemoryJobStore::new()), AppConfig::default())
    }

    #[tokio::test]
    async fn test_duplicate_submission_is_rejected() {
        let manager = manager();
        let first = manager
            .enqueue_invoice_generation(
                InvoiceGenerationData {
                    billing_period: Some("2026-09".to_string()),
                    company_ids: vec![3],
                    send_email: true,
                },
                Some(3),
            )
            .await
            .unwrap();
        assert_eq!(first.priority, JobPriority::HIGH);

        let err = manager
            .enqueue_invoice_generation(
                InvoiceGenerationData {
                    billing_period: Some("2026-09".to_string()),
                    company_ids: vec![3],
                    send_email: true,
                },
                Some(3),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::DuplicateJob { .. }));
        assert!(manager.check_duplicate(&first).await.unwrap());
        assert_eq!(manager.get_queue_stats().await.unwrap().pending, 1);
        assert_eq!(manager.get_metrics().await.enqueued, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_identical_submissions_enqueue_once() {
        let manager = Arc::new(manager());
        let submissions: Vec<_> = (0..12)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    manager
                        .enqueue_invoice_generation(
                            InvoiceGenerationData {
                                billing_period: Some("2026-10".to_string()),
                                company_ids: vec![8],
                                send_email: false,
                            },
                            Some(8),
                        )
                        .await
                })
            })
            .collect();

        let mut accepted = 0;
        for submission in submissions {
            match submission.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(err) => assert!(matches!(err, JobError::DuplicateJob { .. })),
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(manager.get_queue_stats().await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn test_dedup_disabled_accepts_repeats() {
        let mut config = AppConfig::default();
        config.dedup.enabled = false;
        let manager = JobManager::new(Arc::new(InMemoryJobStore::new()), config);

        let job = JobBuilder::notification().build();
        manager.enqueue_job(job.clone()).await.unwrap();
        manager.enqueue_job(job.clone()).await.unwrap();
        assert!(!manager.check_duplicate(&job).await.unwrap());
        assert_eq!(manager.get_queue_stats().await.unwrap().pending, 2);
    }

    #[tokio::test]
    async fn test_convenience_defaults() {
        let manager = manager();
        let cleanup = manager
            .enqueue_data_cleanup(DataCleanupData::default(), None)
            .await
            .unwrap();
        assert_eq!((cleanup.priority, cleanup.max_retries), (JobPriority::LOW, 2));

        let notification = manager
            .enqueue_notification(NotificationData::default(), Some(1))
            .await
            .unwrap();
        assert_eq!(
            (notification.priority, notification.max_retries),
            (JobPriority::HIGH, 5)
        );

        let report = manager
            .enqueue_report_generation(ReportGenerationData::default(), Some(1))
            .await
            .unwrap();
        assert_eq!((report.priority, report.max_retries), (JobPriority::NORMAL, 3));

        let analytics = manager
            .enqueue_analytics_aggregation(AnalyticsAggregationData::default(), None)
            .await
            .unwrap();
        assert_eq!((analytics.priority, analytics.max_retries), (JobPriority::LOW, 3));
    }

    #[tokio::test]
    async fn test_cancel_and_operator_retry() {
        let manager = manager();
        let job = manager
            .enqueue_job(JobBuilder::report().build())
            .await
            .unwrap();

        let cancelled = manager.cancel_job(&job.id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert_eq!(manager.get_metrics().await.cancelled, 1);
        assert!(matches!(
            manager.cancel_job(&job.id).await.unwrap_err(),
            JobError::InvalidStateTransition { .. }
        ));

        let retried = manager.retry_job(&job.id).await.unwrap();
        assert_eq!(retried.status, JobStatus::Pending);
        assert_eq!(retried.retry_count, 0);
    }

    #[tokio::test]
    async fn test_get_job_status_not_found() {
        let manager = manager();
        assert!(matches!(
            manager.get_job_status("missing").await.unwrap_err(),
            JobError::JobNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_lifecycle_errors() {
        let manager = manager();
        assert!(matches!(
            manager.stop().await.unwrap_err(),
            JobError::NotRunning(_)
        ));
        manager.start().await.unwrap();
        assert!(matches!(
            manager.start().await.unwrap_err(),
            JobError::AlreadyRunning(_)
        ));
        assert_eq!(manager.list_scheduled_jobs().await.len(), 5);
        manager.stop().await.unwrap();
        assert!(!manager.is_running().await);
    }
}
