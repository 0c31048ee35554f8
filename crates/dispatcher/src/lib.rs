//! # 任务调度与维护
//!
//! - [`scheduler::JobScheduler`] - 周期性模板的注册、持久化与触发
//! - [`deduplicator::Deduplicator`] - 基于指纹的重复提交检测
//! - [`priority_adjuster::PriorityAdjuster`] - 防饥饿的优先级调整
//! - [`purger::Purger`] - 按保留期清理终态任务
//! - [`recovery_service::RecoveryService`] - 重试提升、租约回收等周期维护

pub mod deduplicator;
pub mod priority_adjuster;
pub mod purger;
pub mod recovery_service;
pub mod schedule_utils;
pub mod scheduler;

pub use deduplicator::{Claim, Deduplicator};
pub use priority_adjuster::PriorityAdjuster;
pub use purger::Purger;
pub use recovery_service::{RecoveryReport, RecoveryService};
pub use schedule_utils::{parse_duration, validate_schedule, Schedule};
pub use scheduler::{default_templates, JobScheduler};
