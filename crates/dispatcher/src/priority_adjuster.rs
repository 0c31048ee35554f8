use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use fleet_jobs_core::models::{Job, JobPriority};
use fleet_jobs_core::JobResult;
use fleet_jobs_infrastructure::{JobQueue, StructuredLogger};

/// 等待超过该时长加2
const FIRST_BOOST_AFTER_MINUTES: i64 = 30;
/// 等待超过该时长再加3
const SECOND_BOOST_AFTER_MINUTES: i64 = 60;

/// 防饥饿的优先级调整
///
/// 以提交时的 `base_priority` 为起点计算，重复调整不会累加。
pub struct PriorityAdjuster {
    queue: JobQueue,
}

impl PriorityAdjuster {
    pub fn new(queue: JobQueue) -> Self {
        Self { queue }
    }

    /// 计算任务当前应有的优先级
    pub fn adjust_priority(job: &Job, now: DateTime<Utc>) -> JobPriority {
        let waited = job.wait_time(now);
        let mut priority = i64::from(job.base_priority.value());
        if waited > Duration::minutes(FIRST_BOOST_AFTER_MINUTES) {
            priority += 2;
        }
        if waited > Duration::minutes(SECOND_BOOST_AFTER_MINUTES) {
            priority += 3;
        }
        priority -= i64::from(job.retry_count);
        JobPriority::clamped(priority)
    }

    /// 重新计算所有等待中任务的优先级，并重排就绪集合
    ///
    /// 返回优先级发生变化的任务数。
    pub async fn adjust_all_priorities(&self, now: DateTime<Utc>) -> JobResult<usize> {
        let ids = self.queue.pending_ids().await?;
        let scanned = ids.len();
        let mut changed = 0;

        for id in ids {
            let Some(job) = self.queue.get_job(&id).await? else {
                continue;
            };
            let adjusted = Self::adjust_priority(&job, now);
            if adjusted == job.priority {
                continue;
            }
            match self.queue.reprioritize(&id, adjusted).await {
                Ok(true) => {
                    debug!(
                        "任务 {} 优先级调整: {} -> {}",
                        id, job.priority, adjusted
                    );
                    changed += 1;
                }
                Ok(false) => debug!("任务 {} 已被领取，跳过优先级调整", id),
                Err(e) => warn!("调整任务 {} 优先级失败: {}", id, e),
            }
        }

        StructuredLogger::log_priorities_adjusted(scanned, changed);
        Ok(changed)
    }
}
