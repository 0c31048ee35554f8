use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 各状态的任务数量
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub retrying: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl QueueStats {
    /// 等待执行的任务总数（含等待重试）
    pub fn depth(&self) -> u64 {
        self.pending + self.retrying
    }

    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.retrying + self.completed + self.failed + self.cancelled
    }
}

/// 清理预览统计
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PurgeStats {
    pub cutoff: DateTime<Utc>,
    pub completed_total: u64,
    pub completed_eligible: u64,
    pub failed_total: u64,
    pub failed_eligible: u64,
    pub cancelled_total: u64,
    pub cancelled_eligible: u64,
}

impl PurgeStats {
    pub fn total_eligible(&self) -> u64 {
        self.completed_eligible + self.failed_eligible + self.cancelled_eligible
    }
}

/// 全局任务指标快照
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobMetrics {
    pub enqueued: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retried: u64,
    pub cancelled: u64,
    pub queue_depth: u64,
    pub processing: u64,
    pub avg_duration_ms: f64,
    pub min_duration_ms: Option<u64>,
    pub max_duration_ms: Option<u64>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl JobMetrics {
    /// 失败率；尚未处理任何任务时为0
    pub fn failure_rate(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.failed as f64 / self.processed as f64
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.processed as f64
        }
    }
}

/// 按任务类型统计的指标
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobTypeMetrics {
    pub enqueued: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub avg_duration_ms: f64,
    pub min_duration_ms: Option<u64>,
    pub max_duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertSeverity::Warning => f.write_str("warning"),
            AlertSeverity::Critical => f.write_str("critical"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    HighFailureRate,
    HighProcessingCount,
    HighQueueDepth,
}

/// 阈值告警，携带实测值与阈值
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureAlert {
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
    pub triggered_at: DateTime<Utc>,
}
