use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use fleet_jobs_core::config::MaintenanceConfig;
use fleet_jobs_core::models::JobStatus;
use fleet_jobs_core::{retention_cutoff, retention_from_hours, JobError, JobResult};
use fleet_jobs_infrastructure::{JobMetricsCollector, JobQueue, StructuredLogger};

use crate::priority_adjuster::PriorityAdjuster;
use crate::purger::Purger;

/// 一轮维护的结果
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// 提升回就绪集合的到期重试任务
    pub promoted: usize,
    /// 租约过期后放回队列的任务
    pub recovered: usize,
    /// 本轮未执行优先级调整时为 `None`
    pub adjusted: Option<usize>,
    /// 本轮未执行自动清理时为 `None`
    pub purged: Option<u64>,
}

#[derive(Debug, Default)]
struct MaintenanceClock {
    last_adjust: Option<DateTime<Utc>>,
    last_purge: Option<DateTime<Utc>>,
}

fn is_due(last: Option<DateTime<Utc>>, every: Duration, now: DateTime<Utc>) -> bool {
    match last {
        None => true,
        Some(last) => (now - last).to_std().map(|e| e >= every).unwrap_or(false),
    }
}

/// 队列维护服务
///
/// 周期性地提升到期重试、回收过期租约、刷新队列深度指标，
/// 并按各自的间隔执行优先级调整与保留期清理。
pub struct RecoveryService {
    queue: JobQueue,
    adjuster: PriorityAdjuster,
    purger: Purger,
    metrics: Option<Arc<JobMetricsCollector>>,
    config: MaintenanceConfig,
    visibility_timeout: Duration,
    clock: Mutex<MaintenanceClock>,
    shutdown_tx: RwLock<Option<broadcast::Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    is_running: RwLock<bool>,
}

impl RecoveryService {
    pub fn new(queue: JobQueue, config: MaintenanceConfig, visibility_timeout: Duration) -> Self {
        Self {
            adjuster: PriorityAdjuster::new(queue.clone()),
            purger: Purger::new(queue.clone()),
            queue,
            metrics: None,
            config,
            visibility_timeout,
            clock: Mutex::new(MaintenanceClock::default()),
            shutdown_tx: RwLock::new(None),
            handle: Mutex::new(None),
            is_running: RwLock::new(false),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<JobMetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// 执行一轮维护
    pub async fn run_once(&self, now: DateTime<Utc>) -> JobResult<RecoveryReport> {
        let mut report = RecoveryReport {
            promoted: self.queue.promote_due_jobs(now).await?,
            recovered: self
                .queue
                .recover_expired_leases(self.visibility_timeout, now)
                .await?,
            ..Default::default()
        };

        if let Some(metrics) = &self.metrics {
            let stats = self.queue.get_queue_stats().await?;
            metrics.update_queue_gauges(&stats).await;
            for alert in metrics.failure_alerts().await {
                StructuredLogger::log_alert(&alert);
            }
        }

        let (adjust_due, purge_due) = {
            let clock = self.clock.lock().await;
            let adjust_due = self
                .config
                .priority_adjust_interval()
                .is_some_and(|every| is_due(clock.last_adjust, every, now));
            let purge_due = self.config.auto_purge_retention_hours.is_some()
                && is_due(clock.last_purge, self.config.auto_purge_interval(), now);
            (adjust_due, purge_due)
        };

        if adjust_due {
            report.adjusted = Some(self.adjuster.adjust_all_priorities(now).await?);
            self.clock.lock().await.last_adjust = Some(now);
        }

        if let (true, Some(hours)) = (purge_due, self.config.auto_purge_retention_hours) {
            let cutoff = retention_cutoff(now, retention_from_hours(hours)?)?;
            let mut purged = 0;
            for status in [JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled] {
                purged += self.purger.purge_before(status, cutoff).await?;
            }
            report.purged = Some(purged);
            self.clock.lock().await.last_purge = Some(now);
        }

        if report.promoted > 0 || report.recovered > 0 {
            info!(
                "维护完成: 提升重试 {} 个, 回收租约 {} 个",
                report.promoted, report.recovered
            );
        } else {
            debug!("维护完成: {:?}", report);
        }
        Ok(report)
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// 启动维护循环
    pub async fn start(self: &Arc<Self>) -> JobResult<()> {
        let mut is_running = self.is_running.write().await;
        if *is_running {
            return Err(JobError::AlreadyRunning("recovery service"));
        }

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        *self.shutdown_tx.write().await = Some(shutdown_tx);

        let service = Arc::clone(self);
        let every = self.config.recovery_interval();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(every);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = service.run_once(Utc::now()).await {
                            if e.is_transient() {
                                warn!("维护周期存储不可用，稍后重试: {}", e);
                            } else {
                                error!("维护周期失败: {}", e);
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("维护服务收到停止信号");
                        break;
                    }
                }
            }
        });
        *self.handle.lock().await = Some(handle);

        *is_running = true;
        info!("维护服务启动，间隔: {:?}", every);
        Ok(())
    }

    pub async fn stop(&self) -> JobResult<()> {
        let mut is_running = self.is_running.write().await;
        if !*is_running {
            return Ok(());
        }

        if let Some(shutdown_tx) = self.shutdown_tx.write().await.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("维护任务退出异常: {}", e);
            }
        }

        *is_running = false;
        info!("维护服务已停止");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_jobs_infrastructure::InMemoryJobStore;
    use fleet_jobs_testing_utils::JobBuilder;

    fn queue() -> JobQueue {
        JobQueue::new(
            Arc::new(InMemoryJobStore::new()),
            "maintenance_queue",
            Duration::from_secs(3600),
        )
    }

    fn config() -> MaintenanceConfig {
        MaintenanceConfig {
            priority_adjust_interval_seconds: 300,
            auto_purge_retention_hours: None,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_expired_lease_is_returned_without_retry() {
        let queue = queue();
        let job = queue.enqueue(JobBuilder::report().build()).await.unwrap();
        queue.dequeue().await.unwrap().unwrap();

        let service = RecoveryService::new(queue.clone(), config(), Duration::from_secs(600));
        let report = service.run_once(Utc::now()).await.unwrap();
        assert_eq!(report.recovered, 0);

        let later = Utc::now() + chrono::Duration::minutes(11);
        let report = service.run_once(later).await.unwrap();
        assert_eq!(report.recovered, 1);

        let stored = queue.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert_eq!(stored.retry_count, 0);
        assert!(stored.started_at.is_none());
    }

    #[tokio::test]
    async fn test_due_retries_are_promoted() {
        let queue = queue();
        let job = queue
            .enqueue(JobBuilder::notification().with_max_retries(3).build())
            .await
            .unwrap();
        queue.dequeue().await.unwrap().unwrap();
        queue.fail(&job.id, "smtp timeout").await.unwrap();

        let service = RecoveryService::new(queue.clone(), config(), Duration::from_secs(600));
        let report = service
            .run_once(Utc::now() + chrono::Duration::seconds(2))
            .await
            .unwrap();
        assert_eq!(report.promoted, 1);
        assert_eq!(
            queue.get_job(&job.id).await.unwrap().unwrap().status,
            JobStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_adjustment_runs_on_its_own_interval() {
        let service = RecoveryService::new(queue(), config(), Duration::from_secs(600));
        let now = Utc::now();
        assert_eq!(service.run_once(now).await.unwrap().adjusted, Some(0));
        assert_eq!(
            service
                .run_once(now + chrono::Duration::seconds(30))
                .await
                .unwrap()
                .adjusted,
            None
        );
        assert_eq!(
            service
                .run_once(now + chrono::Duration::seconds(301))
                .await
                .unwrap()
                .adjusted,
            Some(0)
        );
    }

    #[tokio::test]
    async fn test_auto_purge_when_retention_configured() {
        let queue = queue();
        queue.enqueue(JobBuilder::report().build()).await.unwrap();
        let claimed = queue.dequeue().await.unwrap().unwrap();
        queue.complete(&claimed.id, None).await.unwrap();
        let dropped = queue.enqueue(JobBuilder::notification().build()).await.unwrap();
        queue.cancel(&dropped.id).await.unwrap();

        let service = RecoveryService::new(
            queue.clone(),
            MaintenanceConfig {
                priority_adjust_interval_seconds: 0,
                auto_purge_retention_hours: Some(1),
                ..Default::default()
            },
            Duration::from_secs(600),
        );
        let report = service
            .run_once(Utc::now() + chrono::Duration::hours(2))
            .await
            .unwrap();
        assert_eq!(report.adjusted, None);
        assert_eq!(report.purged, Some(2));
        let stats = queue.get_queue_stats().await.unwrap();
        assert_eq!(stats.completed, 0);
        assert_eq!(stats.cancelled, 0);
    }

    #[tokio::test]
    async fn test_auto_purge_rejects_unrepresentable_retention() {
        let service = RecoveryService::new(
            queue(),
            MaintenanceConfig {
                priority_adjust_interval_seconds: 0,
                auto_purge_retention_hours: Some(u64::MAX),
                ..Default::default()
            },
            Duration::from_secs(600),
        );
        let err = service.run_once(Utc::now()).await.unwrap_err();
        assert!(matches!(err, JobError::InvalidRetention(_)));
    }

    #[tokio::test]
    async fn test_start_stop() {
        let service = Arc::new(RecoveryService::new(
            queue(),
            config(),
            Duration::from_secs(600),
        ));
        service.start().await.unwrap();
        assert!(service.start().await.is_err());
        service.stop().await.unwrap();
        assert!(!service.is_running().await);
        service.stop().await.unwrap();
    }
}
