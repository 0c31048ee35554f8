//! # 任务执行
//!
//! [`WorkerPool`] 按配置的并发度从队列领取任务，交给 [`HandlerRegistry`]
//! 中对应类型的处理器执行，并把结果写回队列与指标收集器。

pub mod handlers;
pub mod pool;
pub mod registry;

pub use handlers::{DataCleanupHandler, NotificationHandler};
pub use pool::{PoolStats, WorkerPool, WorkerPoolBuilder, NO_HANDLER_ERROR};
pub use registry::HandlerRegistry;
