use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::{Job, JobPriority};
use super::payload::{JobPayload, JobType};

/// 定时任务标签
pub const SCHEDULED_TAG: &str = "scheduled";

/// 周期性任务模板
///
/// 调度器每次触发都会根据模板生成一个新的 [`Job`]，并更新 `last_run` 与 `next_run`。
/// 模板只能被显式注销，不会自动删除。
///
/// `schedule` 支持 `@hourly`、`@daily`、`@weekly`、`@monthly`，
/// 字面时长（如 `"90m"`、`"1h30m"`），以及CRON表达式。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledJob {
    pub id: String,
    pub name: String,
    pub payload: JobPayload,
    pub priority: JobPriority,
    pub company_id: Option<i64>,
    pub user_id: Option<i64>,
    pub schedule: String,
    pub is_active: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: DateTime<Utc>,
}

impl ScheduledJob {
    /// 创建模板；`next_run` 在注册时由调度器计算
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        payload: JobPayload,
        schedule: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            payload,
            priority: JobPriority::NORMAL,
            company_id: None,
            user_id: None,
            schedule: schedule.into(),
            is_active: true,
            last_run: None,
            next_run: Utc::now(),
        }
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_company(mut self, company_id: i64) -> Self {
        self.company_id = Some(company_id);
        self
    }

    pub fn job_type(&self) -> JobType {
        self.payload.job_type()
    }

    /// 检查模板是否到期
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.next_run <= now
    }

    /// 根据模板生成一个新任务，带 `scheduled` 与模板ID标签
    pub fn materialize(&self) -> Job {
        let mut job = Job::new(self.payload.clone())
            .with_priority(self.priority)
            .with_tag(SCHEDULED_TAG)
            .with_tag(self.id.clone());
        job.company_id = self.company_id;
        job.user_id = self.user_id;
        job
    }
}
