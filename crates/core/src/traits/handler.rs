//! 任务处理器接口定义
//!
//! 工作池只依赖 [`JobHandler`]：按 [`JobType`] 注册，接收任务并返回结果载荷。
//! 业务处理器通常实现 [`TypedJobHandler`]，直接拿到类型化的载荷数据，
//! 再通过 [`TypedHandler`] 适配成 [`JobHandler`] 注册。
//!
//! 处理器的 future 在超时或关闭时会被丢弃，任何 `.await` 点都是取消点。
//!
//! ```rust
//! use async_trait::async_trait;
//! use fleet_jobs_core::models::{Job, NotificationData};
//! use fleet_jobs_core::traits::{HandlerOutput, TypedHandler, TypedJobHandler};
//! use fleet_jobs_core::JobResult;
//!
//! struct SmsNotifier;
//!
//! #[async_trait]
//! impl TypedJobHandler for SmsNotifier {
//!     type Data = NotificationData;
//!
//!     async fn execute(&self, _job: &Job, data: &NotificationData) -> JobResult<HandlerOutput> {
//!         Ok(Some(serde_json::json!({ "sent": data.recipients.len() })))
//!     }
//! }
//!
//! let handler = TypedHandler::new(SmsNotifier);
//! ```

use async_trait::async_trait;

use crate::errors::{JobError, JobResult};
use crate::models::{Job, JobData, JobType};

/// 处理器输出，写入 `Job::result`
pub type HandlerOutput = Option<serde_json::Value>;

#[async_trait]
pub trait JobHandler: Send + Sync {
    /// 处理器负责的任务类型
    fn job_type(&self) -> JobType;

    /// 执行任务；返回错误时任务进入重试流程
    async fn handle(&self, job: &Job) -> JobResult<HandlerOutput>;
}

/// 类型化处理器
#[async_trait]
pub trait TypedJobHandler: Send + Sync + 'static {
    type Data: JobData;

    async fn execute(&self, job: &Job, data: &Self::Data) -> JobResult<HandlerOutput>;
}

/// 将 [`TypedJobHandler`] 适配为 [`JobHandler`]
pub struct TypedHandler<H> {
    inner: H,
}

impl<H: TypedJobHandler> TypedHandler<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }
}

#[async_trait]
impl<H: TypedJobHandler> JobHandler for TypedHandler<H> {
    fn job_type(&self) -> JobType {
        <H::Data as JobData>::JOB_TYPE
    }

    async fn handle(&self, job: &Job) -> JobResult<HandlerOutput> {
        let data = <H::Data as JobData>::from_payload(&job.payload).ok_or(
            JobError::PayloadMismatch {
                expected: <H::Data as JobData>::JOB_TYPE,
                actual: job.job_type(),
            },
        )?;
        self.inner.execute(job, data).await
    }
}
