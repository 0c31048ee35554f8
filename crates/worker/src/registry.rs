use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use fleet_jobs_core::models::JobType;
use fleet_jobs_core::traits::JobHandler;

/// 按任务类型注册的处理器表
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<JobType, Arc<dyn JobHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册处理器，返回被替换的旧处理器
    pub async fn register(&self, handler: Arc<dyn JobHandler>) -> Option<Arc<dyn JobHandler>> {
        let job_type = handler.job_type();
        info!("注册任务处理器: {}", job_type);
        self.handlers.write().await.insert(job_type, handler)
    }

    /// 仅在该类型尚无处理器时注册
    pub async fn register_if_absent(&self, handler: Arc<dyn JobHandler>) -> bool {
        let mut handlers = self.handlers.write().await;
        let job_type = handler.job_type();
        if handlers.contains_key(&job_type) {
            return false;
        }
        info!("注册内置任务处理器: {}", job_type);
        handlers.insert(job_type, handler);
        true
    }

    pub async fn get(&self, job_type: JobType) -> Option<Arc<dyn JobHandler>> {
        self.handlers.read().await.get(&job_type).cloned()
    }

    pub async fn contains(&self, job_type: JobType) -> bool {
        self.handlers.read().await.contains_key(&job_type)
    }

    /// 已注册的任务类型，按类型排序
    pub async fn job_types(&self) -> Vec<JobType> {
        let mut types: Vec<JobType> = self.handlers.read().await.keys().copied().collect();
        types.sort();
        types
    }
}
