//! 车队管理后台任务系统的核心类型
//!
//! 包含任务模型、错误类型、存储与处理器接口以及应用配置，
//! 其余crate都只依赖这里定义的抽象。

pub mod config;
pub mod errors;
pub mod models;
pub mod retention;
pub mod traits;

pub use errors::{JobError, JobResult};
pub use retention::{retention_cutoff, retention_from_days, retention_from_hours, MAX_RETENTION_HOURS};
