use std::sync::Arc;

use anyhow::{Context, Result};
use fleet_jobs_api::create_app;
use fleet_jobs_application::JobManager;
use fleet_jobs_core::config::AppConfig;
use fleet_jobs_core::traits::JobStore;
use fleet_jobs_infrastructure::{InMemoryJobStore, RedisJobStore};
use tokio::{net::TcpListener, sync::broadcast};
use tracing::{error, info, warn};

/// 共享存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    /// 进程内存储，仅用于本地开发；进程退出后数据丢失
    Memory,
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    manager: Arc<JobManager>,
}

impl Application {
    pub async fn new(config: AppConfig, backend: StoreBackend) -> Result<Self> {
        let store: Arc<dyn JobStore> = match backend {
            StoreBackend::Redis => {
                info!("连接Redis: {}", mask_redis_url(&config.redis.url));
                let store = RedisJobStore::connect(&config.redis)
                    .await
                    .context("连接Redis失败")?;
                Arc::new(store)
            }
            StoreBackend::Memory => {
                warn!("使用进程内存储，任务不会持久化");
                Arc::new(InMemoryJobStore::new())
            }
        };

        let manager = Arc::new(JobManager::new(store, config.clone()));
        Ok(Self { config, manager })
    }

    pub fn manager(&self) -> Arc<JobManager> {
        Arc::clone(&self.manager)
    }

    /// 启动任务系统与管理接口，直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        self.manager.start().await.context("启动任务管理器失败")?;

        let server_handle = if self.config.api.enabled {
            let listener = TcpListener::bind(&self.config.api.bind_address)
                .await
                .with_context(|| format!("绑定地址失败: {}", self.config.api.bind_address))?;
            info!("API服务器启动在 http://{}", self.config.api.bind_address);

            let app = create_app(self.manager());
            let mut server_shutdown = shutdown_rx.resubscribe();
            Some(tokio::spawn(async move {
                let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                    let _ = server_shutdown.recv().await;
                });
                if let Err(e) = serve.await {
                    error!("API服务器运行失败: {}", e);
                }
            }))
        } else {
            None
        };

        let _ = shutdown_rx.recv().await;
        info!("应用收到关闭信号");

        if let Err(e) = self.manager.stop().await {
            error!("停止任务管理器失败: {}", e);
        }
        if let Some(handle) = server_handle {
            if let Err(e) = handle.await {
                error!("API服务器退出异常: {}", e);
            }
        }

        info!("应用已停止");
        Ok(())
    }
}

/// 屏蔽Redis URL中的密码
pub fn mask_redis_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            let mut masked = url.to_string();
            masked.replace_range(colon_pos + 1..at_pos, "***");
            return masked;
        }
    }
    url.to_string()
}
