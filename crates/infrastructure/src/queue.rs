use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use fleet_jobs_core::models::{Job, JobPriority, JobStatus, QueueStats};
use fleet_jobs_core::traits::JobStore;
use fleet_jobs_core::{retention_cutoff, JobError, JobResult};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::keys::QueueKeys;
use crate::observability::StructuredLogger;

/// 同一优先级内序号的权重，保证不同优先级的分数区间互不重叠
const PRIORITY_WEIGHT: f64 = 1e12;

/// 就绪集合中的分数：优先级优先，同优先级按入队序号先进先出
pub fn ready_score(priority: JobPriority, sequence: u64) -> f64 {
    priority.value() as f64 * PRIORITY_WEIGHT - sequence as f64
}

/// 由就绪分数还原优先级；序号小于 [`PRIORITY_WEIGHT`]，向上取整即为原优先级
pub fn priority_from_score(score: f64) -> JobPriority {
    JobPriority::clamped((score / PRIORITY_WEIGHT).ceil() as i64)
}

/// 第 `retry_count` 次重试的可见时间，溢出时取最大可表示时间
fn retry_due_at(now: DateTime<Utc>, retry_count: u32) -> DateTime<Utc> {
    let secs = i64::from(retry_count).saturating_mul(i64::from(retry_count));
    Duration::try_seconds(secs)
        .and_then(|backoff| now.checked_add_signed(backoff))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn millis(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64
}

/// 优先级任务队列
///
/// 任务载荷以JSON形式存放在 `{queue}:job:{id}`，各状态由独立的有序集合索引：
///
/// - `{queue}` 就绪集合，分数见 [`ready_score`]，`ZPOPMAX` 即出队
/// - `{queue}:delayed` 等待重试的任务，分数为到期时间（毫秒）
/// - `{queue}:processing` 处理中任务，分数为领取时间，用于租约回收
/// - `{queue}:completed` / `:failed` / `:cancelled` 终态索引，分数为完成时间
///
/// 所有跨键写入都不是事务性的，崩溃可能留下不一致的索引，
/// 读取时会跳过载荷已过期的条目。
///
/// 等待中任务的实时优先级以就绪集合中的分数为准，载荷中的 `priority`
/// 只在入队和出队时写入；调整优先级只改分数，不改写载荷。
#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn JobStore>,
    keys: QueueKeys,
    job_ttl: std::time::Duration,
}

impl JobQueue {
    pub fn new(store: Arc<dyn JobStore>, name: &str, job_ttl: std::time::Duration) -> Self {
        Self {
            store,
            keys: QueueKeys::new(name),
            job_ttl,
        }
    }

    pub fn name(&self) -> &str {
        &self.keys.ready
    }

    pub fn keys(&self) -> &QueueKeys {
        &self.keys
    }

    pub fn store(&self) -> Arc<dyn JobStore> {
        Arc::clone(&self.store)
    }

    async fn save(&self, job: &Job) -> JobResult<()> {
        let json = serde_json::to_string(job)?;
        self.store
            .set(&self.keys.job(&job.id), &json, Some(self.job_ttl))
            .await
    }

    async fn load(&self, id: &str) -> JobResult<Job> {
        self.get_job(id)
            .await?
            .ok_or_else(|| JobError::JobNotFound { id: id.to_string() })
    }

    async fn next_sequence(&self) -> JobResult<u64> {
        let seq = self.store.incr(&self.keys.sequence).await?;
        Ok(seq.max(0) as u64)
    }

    async fn push_ready(&self, job: &mut Job) -> JobResult<()> {
        job.sequence = self.next_sequence().await?;
        self.save(job).await?;
        self.store
            .zadd(&self.keys.ready, &job.id, ready_score(job.priority, job.sequence))
            .await
    }

    /// 提交任务
    ///
    /// 补齐默认值（为空的ID、`Pending` 状态），分配入队序号后写入载荷与就绪集合。
    pub async fn enqueue(&self, mut job: Job) -> JobResult<Job> {
        if job.id.is_empty() {
            job.id = Uuid::new_v4().to_string();
        }
        job.status = JobStatus::Pending;
        job.base_priority = job.priority;
        job.started_at = None;
        job.completed_at = None;

        self.push_ready(&mut job).await?;
        StructuredLogger::log_job_enqueued(&job);
        Ok(job)
    }

    /// 领取优先级最高的任务
    ///
    /// 先提升到期的重试任务，再原子地弹出就绪集合中分数最高的条目；
    /// 队列为空时返回 `None`。
    pub async fn dequeue(&self) -> JobResult<Option<Job>> {
        let now = Utc::now();
        self.promote_due_jobs(now).await?;

        loop {
            let Some((id, score)) = self.store.zpopmax(&self.keys.ready).await? else {
                return Ok(None);
            };

            let Some(mut job) = self.read_job(&id).await? else {
                warn!("Skipping job {} in queue {}: payload expired", id, self.name());
                continue;
            };

            job.priority = priority_from_score(score);
            job.status = JobStatus::Processing;
            job.started_at = Some(now);
            self.store
                .zadd(&self.keys.processing, &job.id, millis(now))
                .await?;
            self.save(&job).await?;

            StructuredLogger::log_job_dequeued(&job);
            return Ok(Some(job));
        }
    }

    /// 标记任务成功
    pub async fn complete(&self, id: &str, result: Option<serde_json::Value>) -> JobResult<Job> {
        let mut job = self.load(id).await?;
        if job.status != JobStatus::Processing {
            return Err(JobError::InvalidStateTransition {
                id: id.to_string(),
                status: job.status,
                operation: "complete",
            });
        }

        let now = Utc::now();
        job.status = JobStatus::Completed;
        job.completed_at = Some(now);
        job.result = result;
        self.save(&job).await?;
        self.store
            .zadd(&self.keys.completed, &job.id, millis(now))
            .await?;
        self.store.zrem(&self.keys.processing, &job.id).await?;
        Ok(job)
    }

    /// 标记任务失败
    ///
    /// 还有重试次数时进入 `Retrying`，在 `now + retry_count²` 秒后重新可见；
    /// 否则进入终态 `Failed`。`retry_count` 永远不会超过 `max_retries`。
    pub async fn fail(&self, id: &str, message: &str) -> JobResult<Job> {
        let mut job = self.load(id).await?;
        if job.status != JobStatus::Processing {
            return Err(JobError::InvalidStateTransition {
                id: id.to_string(),
                status: job.status,
                operation: "fail",
            });
        }

        let now = Utc::now();
        job.error = Some(message.to_string());

        if job.has_retries_left() {
            job.retry_count += 1;
            job.status = JobStatus::Retrying;
            let due_at = retry_due_at(now, job.retry_count);
            self.save(&job).await?;
            self.store
                .zadd(&self.keys.delayed, &job.id, millis(due_at))
                .await?;
            StructuredLogger::log_job_retry_scheduled(&job, due_at);
        } else {
            job.retry_count = (job.retry_count + 1).min(job.max_retries);
            job.status = JobStatus::Failed;
            job.completed_at = Some(now);
            self.save(&job).await?;
            self.store
                .zadd(&self.keys.failed, &job.id, millis(now))
                .await?;
            StructuredLogger::log_job_failed(&job);
        }

        self.store.zrem(&self.keys.processing, &job.id).await?;
        Ok(job)
    }

    /// 取消任务，只允许 `Pending` 或 `Retrying` 状态
    pub async fn cancel(&self, id: &str) -> JobResult<Job> {
        let mut job = self.load(id).await?;
        if !job.can_cancel() {
            return Err(JobError::InvalidStateTransition {
                id: id.to_string(),
                status: job.status,
                operation: "cancel",
            });
        }

        let removed = self.store.zrem(&self.keys.ready, id).await?
            || self.store.zrem(&self.keys.delayed, id).await?;
        if !removed {
            // 已被工作者领取
            let current = self.get_job(id).await?.map_or(job.status, |j| j.status);
            return Err(JobError::InvalidStateTransition {
                id: id.to_string(),
                status: current,
                operation: "cancel",
            });
        }

        let now = Utc::now();
        job.status = JobStatus::Cancelled;
        job.completed_at = Some(now);
        self.save(&job).await?;
        self.store
            .zadd(&self.keys.cancelled, id, millis(now))
            .await?;
        StructuredLogger::log_job_cancelled(&job);
        Ok(job)
    }

    /// 人工重试：重置重试计数并立即放回就绪集合，跳过退避
    pub async fn requeue(&self, id: &str) -> JobResult<Job> {
        let mut job = self.load(id).await?;
        let source = match job.status {
            JobStatus::Failed => &self.keys.failed,
            JobStatus::Cancelled => &self.keys.cancelled,
            JobStatus::Retrying => &self.keys.delayed,
            status => {
                return Err(JobError::InvalidStateTransition {
                    id: id.to_string(),
                    status,
                    operation: "retry",
                })
            }
        };

        if !self.store.zrem(source, id).await? && job.status == JobStatus::Retrying {
            // 重试任务刚被提升，已在就绪集合中
            return Err(JobError::InvalidStateTransition {
                id: id.to_string(),
                status: JobStatus::Pending,
                operation: "retry",
            });
        }

        job.status = JobStatus::Pending;
        job.retry_count = 0;
        job.priority = job.base_priority;
        job.started_at = None;
        job.completed_at = None;
        self.push_ready(&mut job).await?;
        StructuredLogger::log_job_requeued(&job);
        Ok(job)
    }

    /// 修改仍在就绪集合中的任务的优先级，保持原入队序号
    ///
    /// 唯一的写入是 `ZADD XX`，已被领取的任务不受影响；
    /// 任务不在就绪集合中或优先级未变化时返回 `false`。
    pub async fn reprioritize(&self, id: &str, priority: JobPriority) -> JobResult<bool> {
        let Some(job) = self.get_job(id).await? else {
            return Ok(false);
        };
        if job.status != JobStatus::Pending || job.priority == priority {
            return Ok(false);
        }

        self.store
            .zadd_existing(&self.keys.ready, id, ready_score(priority, job.sequence))
            .await
    }

    /// 将到期的重试任务移回就绪集合
    ///
    /// 每个条目通过 `ZREM` 认领，多个实例同时提升时只有一个会成功。
    pub async fn promote_due_jobs(&self, now: DateTime<Utc>) -> JobResult<usize> {
        let due = self
            .store
            .zrange_by_score(&self.keys.delayed, f64::NEG_INFINITY, millis(now), None)
            .await?;

        let mut promoted = 0;
        for (id, _) in due {
            if !self.store.zrem(&self.keys.delayed, &id).await? {
                continue;
            }
            let Some(mut job) = self.get_job(&id).await? else {
                debug!("Dropping delayed entry {}: payload expired", id);
                continue;
            };
            job.status = JobStatus::Pending;
            self.push_ready(&mut job).await?;
            promoted += 1;
        }

        if promoted > 0 {
            debug!("Promoted {} due retries in queue {}", promoted, self.name());
        }
        Ok(promoted)
    }

    /// 回收租约过期的处理中任务
    ///
    /// 领取时间早于 `now - visibility_timeout` 的任务被放回就绪集合，不计入重试次数。
    /// 载荷仍为 `Pending` 的条目（写入被覆盖）同样放回，其余状态已由对应索引持有。
    pub async fn recover_expired_leases(
        &self,
        visibility_timeout: std::time::Duration,
        now: DateTime<Utc>,
    ) -> JobResult<usize> {
        let cutoff = millis(now) - visibility_timeout.as_millis() as f64;
        let expired = self
            .store
            .zrange_by_score(&self.keys.processing, f64::NEG_INFINITY, cutoff, None)
            .await?;

        let mut recovered = 0;
        for (id, _) in expired {
            if !self.store.zrem(&self.keys.processing, &id).await? {
                continue;
            }
            let Some(mut job) = self.read_job(&id).await? else {
                continue;
            };
            if !matches!(job.status, JobStatus::Processing | JobStatus::Pending) {
                continue;
            }
            let started_at = job.started_at.take();
            job.status = JobStatus::Pending;
            self.push_ready(&mut job).await?;
            StructuredLogger::log_lease_recovered(&job, started_at);
            recovered += 1;
        }
        Ok(recovered)
    }

    async fn read_job(&self, id: &str) -> JobResult<Option<Job>> {
        match self.store.get(&self.keys.job(id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// 读取任务；等待中的任务带上就绪集合中的实时优先级
    pub async fn get_job(&self, id: &str) -> JobResult<Option<Job>> {
        let Some(mut job) = self.read_job(id).await? else {
            return Ok(None);
        };
        if job.status == JobStatus::Pending {
            if let Some(score) = self.store.zscore(&self.keys.ready, id).await? {
                job.priority = priority_from_score(score);
            }
        }
        Ok(Some(job))
    }

    /// 按状态查询任务
    ///
    /// 等待中的任务按出队顺序返回，等待重试的按到期时间，其余按最近事件时间倒序。
    pub async fn get_jobs_by_status(&self, status: JobStatus, limit: usize) -> JobResult<Vec<Job>> {
        let index = self.keys.index_for(status);
        let entries = match status {
            JobStatus::Retrying => {
                self.store
                    .zrange_by_score(index, f64::NEG_INFINITY, f64::INFINITY, None)
                    .await?
            }
            _ => self.store.zrevrange(index, 0, None).await?,
        };

        let mut jobs = Vec::new();
        for (id, _) in entries {
            if jobs.len() >= limit {
                break;
            }
            if let Some(job) = self.get_job(&id).await? {
                if job.status == status {
                    jobs.push(job);
                }
            }
        }
        Ok(jobs)
    }

    pub async fn get_queue_stats(&self) -> JobResult<QueueStats> {
        Ok(QueueStats {
            pending: self.store.zcard(&self.keys.ready).await?,
            processing: self.store.zcard(&self.keys.processing).await?,
            retrying: self.store.zcard(&self.keys.delayed).await?,
            completed: self.store.zcard(&self.keys.completed).await?,
            failed: self.store.zcard(&self.keys.failed).await?,
            cancelled: self.store.zcard(&self.keys.cancelled).await?,
        })
    }

    /// 删除索引时间早于截止时间的终态任务
    pub async fn cleanup(&self, older_than: Duration) -> JobResult<u64> {
        let cutoff = millis(retention_cutoff(Utc::now(), older_than)?);
        let mut removed = 0;
        for index in [&self.keys.completed, &self.keys.failed, &self.keys.cancelled] {
            let entries = self
                .store
                .zrange_by_score(index, f64::NEG_INFINITY, cutoff, None)
                .await?;
            for (id, _) in entries {
                self.store.delete(&self.keys.job(&id)).await?;
                if self.store.zrem(index, &id).await? {
                    removed += 1;
                }
            }
        }
        debug!("Cleaned up {} terminal jobs in queue {}", removed, self.name());
        Ok(removed)
    }

    /// 从载荷与所有索引中删除任务
    pub async fn delete_job(&self, id: &str) -> JobResult<bool> {
        let existed = self.store.delete(&self.keys.job(id)).await?;
        for status in JobStatus::ALL {
            self.store.zrem(self.keys.index_for(status), id).await?;
        }
        Ok(existed)
    }

    /// 从指定终态索引中移除条目，并删除载荷
    pub async fn remove_terminal(&self, status: JobStatus, id: &str) -> JobResult<()> {
        self.store.delete(&self.keys.job(id)).await?;
        self.store.zrem(self.keys.index_for(status), id).await?;
        Ok(())
    }

    /// 终态索引中的全部任务ID
    pub async fn terminal_ids(&self, status: JobStatus) -> JobResult<Vec<String>> {
        let entries = self
            .store
            .zrange_by_score(
                self.keys.index_for(status),
                f64::NEG_INFINITY,
                f64::INFINITY,
                None,
            )
            .await?;
        Ok(entries.into_iter().map(|(id, _)| id).collect())
    }

    /// 就绪集合中所有等待中的任务ID
    pub async fn pending_ids(&self) -> JobResult<Vec<String>> {
        let entries = self.store.zrevrange(&self.keys.ready, 0, None).await?;
        Ok(entries.into_iter().map(|(id, _)| id).collect())
    }
}
