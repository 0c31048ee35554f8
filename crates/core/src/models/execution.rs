use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::{Job, JobStatus};
use super::payload::JobType;

/// 单次任务执行记录
///
/// `status` 为本次执行后的任务状态：`COMPLETED`、`RETRYING` 或 `FAILED`。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionRecord {
    pub job_id: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub worker_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub retry_count: u32,
    pub error: Option<String>,
    pub company_id: Option<i64>,
}

impl ExecutionRecord {
    /// 根据执行后的任务状态构建记录
    pub fn from_job(
        job: &Job,
        worker_id: &str,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;
        Self {
            job_id: job.id.clone(),
            job_type: job.job_type(),
            status: job.status,
            worker_id: worker_id.to_string(),
            started_at,
            finished_at,
            duration_ms,
            retry_count: job.retry_count,
            error: job.error.clone(),
            company_id: job.company_id,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Completed
    }
}
