use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::payload::{JobPayload, JobType};

/// 默认最大重试次数
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// 任务定义
///
/// 表示一个异步执行的工作单元。任务类型由载荷变体决定，
/// 因此任务不可能携带与其类型不符的载荷。
///
/// # 字段说明
///
/// - `id`: 任务唯一标识，为空时由队列在入队时生成
/// - `payload`: 类型化的任务载荷
/// - `priority`: 当前优先级（可能被优先级调整器修改）
/// - `base_priority`: 提交时的优先级，优先级调整以此为起点
/// - `sequence`: 入队序号，同优先级内保证先进先出
/// - `retry_count` / `max_retries`: 重试计数，始终满足 `retry_count <= max_retries`
///
/// # 使用示例
///
/// ```rust
/// use fleet_jobs_core::models::{Job, JobPayload, JobPriority, NotificationData};
///
/// let job = Job::new(JobPayload::Notification(NotificationData::default()))
///     .with_priority(JobPriority::HIGH)
///     .with_company(42);
/// assert_eq!(job.priority, JobPriority::HIGH);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: String,
    pub payload: JobPayload,
    pub priority: JobPriority,
    #[serde(default)]
    pub base_priority: JobPriority,
    #[serde(default)]
    pub sequence: u64,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub error: Option<String>,
    pub result: Option<serde_json::Value>,
    pub company_id: Option<i64>,
    pub user_id: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Job {
    /// 创建新任务，使用默认优先级和重试次数
    pub fn new(payload: JobPayload) -> Self {
        Self {
            id: String::new(),
            payload,
            priority: JobPriority::NORMAL,
            base_priority: JobPriority::NORMAL,
            sequence: 0,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            error: None,
            result: None,
            company_id: None,
            user_id: None,
            tags: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self.base_priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_company(mut self, company_id: i64) -> Self {
        self.company_id = Some(company_id);
        self
    }

    pub fn with_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// 任务类型（由载荷决定）
    pub fn job_type(&self) -> JobType {
        self.payload.job_type()
    }

    /// 是否处于终态
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// 只有等待中或等待重试的任务可以取消
    pub fn can_cancel(&self) -> bool {
        matches!(self.status, JobStatus::Pending | JobStatus::Retrying)
    }

    /// 下一次失败后是否仍可重试
    pub fn has_retries_left(&self) -> bool {
        self.retry_count + 1 < self.max_retries
    }

    /// 自创建以来的等待时长
    pub fn wait_time(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// 任务状态
///
/// ```text
/// Pending → Processing → Completed
///    ↑           ↓
///    └───── Retrying → Failed
/// Pending/Retrying → Cancelled
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum JobStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "PROCESSING")]
    Processing,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "RETRYING")]
    Retrying,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Retrying,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Retrying => "RETRYING",
            JobStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("无效的任务状态: {s}"))
    }
}

/// 任务优先级
///
/// 数值越大越先执行。具名级别为 Low=1、Normal=5、High=10、Critical=20，
/// 优先级调整器可能产生介于两者之间的数值，但永远被限制在 `[LOW, CRITICAL]` 内。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct JobPriority(u8);

impl JobPriority {
    pub const LOW: JobPriority = JobPriority(1);
    pub const NORMAL: JobPriority = JobPriority(5);
    pub const HIGH: JobPriority = JobPriority(10);
    pub const CRITICAL: JobPriority = JobPriority(20);

    /// 将任意整数限制到合法优先级区间
    pub fn clamped(value: i64) -> Self {
        let min = Self::LOW.0 as i64;
        let max = Self::CRITICAL.0 as i64;
        JobPriority(value.clamp(min, max) as u8)
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn label(&self) -> &'static str {
        match self.0 {
            v if v >= Self::CRITICAL.0 => "critical",
            v if v >= Self::HIGH.0 => "high",
            v if v >= Self::NORMAL.0 => "normal",
            _ => "low",
        }
    }
}

impl Default for JobPriority {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl fmt::Display for JobPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.label(), self.0)
    }
}
