use thiserror::Error;

use crate::models::{JobStatus, JobType};

/// 任务系统错误类型定义
#[derive(Debug, Error)]
pub enum JobError {
    #[error("存储错误: {0}")]
    Storage(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("任务未找到: {id}")]
    JobNotFound { id: String },

    #[error("定时任务未找到: {id}")]
    ScheduledJobNotFound { id: String },

    #[error("检测到重复任务: {fingerprint}")]
    DuplicateJob { fingerprint: String },

    #[error("无效的调度表达式: {expr} - {message}")]
    InvalidSchedule { expr: String, message: String },

    #[error("无效的保留时长: {0}")]
    InvalidRetention(String),

    #[error("任务 {id} 当前状态为 {status}，不允许执行 {operation}")]
    InvalidStateTransition {
        id: String,
        status: JobStatus,
        operation: &'static str,
    },

    #[error("未注册任务类型 {job_type} 的处理器 (no handler)")]
    HandlerNotFound { job_type: JobType },

    #[error("任务执行错误: {0}")]
    HandlerExecution(String),

    #[error("任务执行超时: {timeout_seconds}秒")]
    ExecutionTimeout { timeout_seconds: u64 },

    #[error("任务载荷与处理器类型不匹配: 期望 {expected}, 实际 {actual}")]
    PayloadMismatch { expected: JobType, actual: JobType },

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("组件已在运行: {0}")]
    AlreadyRunning(&'static str),

    #[error("组件未运行: {0}")]
    NotRunning(&'static str),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl JobError {
    /// 存储不可达等瞬时错误
    pub fn is_transient(&self) -> bool {
        matches!(self, JobError::Storage(_))
    }
}

impl From<serde_json::Error> for JobError {
    fn from(err: serde_json::Error) -> Self {
        JobError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type JobResult<T> = std::result::Result<T, JobError>;

