//! # 数据模型
//!
//! 后台任务系统的核心数据结构：
//!
//! - [`Job`] - 异步执行的工作单元，载荷由 [`JobPayload`] 类型化
//! - [`ScheduledJob`] - 周期性任务模板
//! - [`ExecutionRecord`] - 单次执行记录，用于指标和历史查询
//! - [`QueueStats`] / [`PurgeStats`] / [`JobMetrics`] - 队列、清理与执行统计
//!
//! 所有时间字段使用 `DateTime<Utc>`，所有模型支持 serde 序列化，
//! 以JSON形式存储在共享存储中。

pub mod execution;
pub mod job;
pub mod payload;
pub mod scheduled_job;
pub mod stats;

pub use execution::*;
pub use job::*;
pub use payload::*;
pub use scheduled_job::*;
pub use stats::*;
