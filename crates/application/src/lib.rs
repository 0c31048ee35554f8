//! # 任务系统门面
//!
//! [`JobManager`] 组装队列、工作池、调度器、去重、优先级调整、清理与指标，
//! 是业务代码和管理接口唯一需要持有的入口。

pub mod manager;

pub use manager::JobManager;
