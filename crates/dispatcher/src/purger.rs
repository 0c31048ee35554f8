use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use fleet_jobs_core::models::{JobStatus, PurgeStats};
use fleet_jobs_core::{retention_cutoff, JobResult};
use fleet_jobs_infrastructure::{JobQueue, StructuredLogger};

#[derive(Debug, Default, Clone, Copy)]
struct ScanResult {
    total: u64,
    eligible: u64,
}

/// 按保留期清理终态任务
pub struct Purger {
    queue: JobQueue,
}

impl Purger {
    pub fn new(queue: JobQueue) -> Self {
        Self { queue }
    }

    /// 删除完成时间早于 `now - older_than` 的已完成任务
    pub async fn purge_completed(&self, older_than: Duration) -> JobResult<u64> {
        self.purge_before(JobStatus::Completed, retention_cutoff(Utc::now(), older_than)?)
            .await
    }

    /// 删除完成时间早于 `now - older_than` 的已失败任务
    pub async fn purge_failed(&self, older_than: Duration) -> JobResult<u64> {
        self.purge_before(JobStatus::Failed, retention_cutoff(Utc::now(), older_than)?)
            .await
    }

    /// 删除取消时间早于 `now - older_than` 的已取消任务
    pub async fn purge_cancelled(&self, older_than: Duration) -> JobResult<u64> {
        self.purge_before(JobStatus::Cancelled, retention_cutoff(Utc::now(), older_than)?)
            .await
    }

    /// 清理预览，不删除任何数据
    ///
    /// 保留期超出时间范围时返回 [`JobError::InvalidRetention`](fleet_jobs_core::JobError::InvalidRetention)。
    pub async fn get_purge_stats(&self, older_than: Duration) -> JobResult<PurgeStats> {
        let cutoff = retention_cutoff(Utc::now(), older_than)?;
        let completed = self.scan(JobStatus::Completed, cutoff, false).await?;
        let failed = self.scan(JobStatus::Failed, cutoff, false).await?;
        let cancelled = self.scan(JobStatus::Cancelled, cutoff, false).await?;
        Ok(PurgeStats {
            cutoff,
            completed_total: completed.total,
            completed_eligible: completed.eligible,
            failed_total: failed.total,
            failed_eligible: failed.eligible,
            cancelled_total: cancelled.total,
            cancelled_eligible: cancelled.eligible,
        })
    }

    /// 删除指定终态中完成时间早于 `cutoff` 的任务
    pub async fn purge_before(&self, status: JobStatus, cutoff: DateTime<Utc>) -> JobResult<u64> {
        let result = self.scan(status, cutoff, true).await?;
        StructuredLogger::log_jobs_purged(status.as_str(), result.eligible, cutoff);
        Ok(result.eligible)
    }

    async fn scan(&self, status: JobStatus, cutoff: DateTime<Utc>, delete: bool) -> JobResult<ScanResult> {
        let ids = self.queue.terminal_ids(status).await?;
        let mut result = ScanResult {
            total: ids.len() as u64,
            eligible: 0,
        };

        for id in ids {
            let eligible = match self.queue.get_job(&id).await? {
                Some(job) => job.completed_at.is_some_and(|at| at < cutoff),
                None => {
                    // 载荷已过期，只剩悬空索引
                    debug!("任务 {} 的载荷已过期，移除索引", id);
                    true
                }
            };
            if !eligible {
                continue;
            }
            result.eligible += 1;
            if delete {
                self.queue.remove_terminal(status, &id).await?;
            }
        }
        Ok(result)
    }
}
