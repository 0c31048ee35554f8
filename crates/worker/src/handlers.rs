//! 内置任务处理器
//!
//! 管理器启动时注册，调用方注册的同类型处理器优先。

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use fleet_jobs_core::models::{CleanupTarget, DataCleanupData, Job, NotificationChannel, NotificationData};
use fleet_jobs_core::traits::{HandlerOutput, TypedJobHandler};
use fleet_jobs_core::{retention_from_days, JobError, JobResult};
use fleet_jobs_dispatcher::Purger;
use fleet_jobs_infrastructure::JobQueue;

/// 按载荷中的保留期清理终态任务
pub struct DataCleanupHandler {
    purger: Purger,
}

impl DataCleanupHandler {
    pub fn new(queue: JobQueue) -> Self {
        Self {
            purger: Purger::new(queue),
        }
    }
}

#[async_trait]
impl TypedJobHandler for DataCleanupHandler {
    type Data = DataCleanupData;

    async fn execute(&self, job: &Job, data: &DataCleanupData) -> JobResult<HandlerOutput> {
        let retention = retention_from_days(data.retention_days)?;
        let mut completed = 0;
        let mut failed = 0;
        let mut cancelled = 0;
        for target in &data.targets {
            match target {
                CleanupTarget::CompletedJobs => {
                    completed += self.purger.purge_completed(retention).await?
                }
                CleanupTarget::FailedJobs => failed += self.purger.purge_failed(retention).await?,
                CleanupTarget::CancelledJobs => {
                    cancelled += self.purger.purge_cancelled(retention).await?
                }
            }
        }

        info!(
            "数据清理完成: 任务 {}, 保留 {} 天, 已完成 {} 个, 已失败 {} 个, 已取消 {} 个",
            job.id, data.retention_days, completed, failed, cancelled
        );
        Ok(Some(json!({
            "retention_days": data.retention_days,
            "completed_purged": completed,
            "failed_purged": failed,
            "cancelled_purged": cancelled,
        })))
    }
}

/// 通知投递
///
/// 实际的邮件、短信和推送通道由外部服务负责，这里只记录投递并返回摘要。
/// 站内通知没有收件人时发送给整个公司。
pub struct NotificationHandler;

#[async_trait]
impl TypedJobHandler for NotificationHandler {
    type Data = NotificationData;

    async fn execute(&self, job: &Job, data: &NotificationData) -> JobResult<HandlerOutput> {
        if data.recipients.is_empty() && data.channel != NotificationChannel::InApp {
            return Err(JobError::HandlerExecution(format!(
                "通知 {} 没有收件人",
                job.id
            )));
        }

        info!(
            event = "notification_delivered",
            job.id = %job.id,
            channel = ?data.channel,
            recipients = data.recipients.len(),
            company_id = ?job.company_id,
            subject = %data.subject,
            "Notification delivered"
        );
        Ok(Some(json!({
            "channel": data.channel,
            "delivered": data.recipients.len(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_jobs_core::models::JobPayload;
    use fleet_jobs_core::traits::{JobHandler, JobStore, TypedHandler};
    use fleet_jobs_infrastructure::InMemoryJobStore;
    use fleet_jobs_testing_utils::JobBuilder;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_cleanup_handler_purges_old_jobs() {
        let store = Arc::new(InMemoryJobStore::new());
        let queue = JobQueue::new(store.clone(), "cleanup_queue", std::time::Duration::from_secs(3600));

        queue.enqueue(JobBuilder::report().build()).await.unwrap();
        let claimed = queue.dequeue().await.unwrap().unwrap();
        let mut done = queue.complete(&claimed.id, None).await.unwrap();
        done.completed_at = Some(chrono::Utc::now() - chrono::Duration::days(40));
        store
            .set(&queue.keys().job(&done.id), &serde_json::to_string(&done).unwrap(), None)
            .await
            .unwrap();

        let handler = TypedHandler::new(DataCleanupHandler::new(queue.clone()));
        let job = JobBuilder::data_cleanup().build();
        let output = handler.handle(&job).await.unwrap().unwrap();
        assert_eq!(output["completed_purged"], 1);
        assert_eq!(output["failed_purged"], 0);
        assert_eq!(output["cancelled_purged"], 0);
        assert!(queue.get_job(&done.id).await.unwrap().is_none());
        assert_eq!(queue.get_queue_stats().await.unwrap().completed, 0);
    }

    #[tokio::test]
    async fn test_cleanup_handler_purges_cancelled_jobs() {
        let queue = JobQueue::new(
            Arc::new(InMemoryJobStore::new()),
            "cleanup_queue",
            std::time::Duration::from_secs(3600),
        );
        let pending = queue.enqueue(JobBuilder::notification().build()).await.unwrap();
        queue.cancel(&pending.id).await.unwrap();

        let handler = TypedHandler::new(DataCleanupHandler::new(queue.clone()));
        let job = JobBuilder::new(JobPayload::DataCleanup(DataCleanupData {
            retention_days: 0,
            targets: vec![CleanupTarget::CancelledJobs],
        }))
        .build();
        let output = handler.handle(&job).await.unwrap().unwrap();
        assert_eq!(output["cancelled_purged"], 1);
        assert_eq!(queue.get_queue_stats().await.unwrap().cancelled, 0);
    }

    #[tokio::test]
    async fn test_cleanup_handler_rejects_unbounded_retention() {
        let queue = JobQueue::new(
            Arc::new(InMemoryJobStore::new()),
            "cleanup_queue",
            std::time::Duration::from_secs(3600),
        );
        let handler = TypedHandler::new(DataCleanupHandler::new(queue));
        let job = JobBuilder::new(JobPayload::DataCleanup(DataCleanupData {
            retention_days: u32::MAX,
            ..Default::default()
        }))
        .build();
        assert!(matches!(
            handler.handle(&job).await.unwrap_err(),
            JobError::InvalidRetention(_)
        ));
    }

    #[tokio::test]
    async fn test_notification_requires_recipients_outside_in_app() {
        let handler = TypedHandler::new(NotificationHandler);

        let email_with_recipients = JobBuilder::notification().build();
        assert!(handler.handle(&email_with_recipients).await.is_ok());

        let email = JobBuilder::new(JobPayload::Notification(NotificationData {
            channel: NotificationChannel::Email,
            subject: "保险到期".to_string(),
            ..Default::default()
        }))
        .build();
        assert!(matches!(
            handler.handle(&email).await.unwrap_err(),
            JobError::HandlerExecution(_)
        ));
    }
}
