use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Redis连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
    pub connection_timeout_seconds: u64,
    pub max_retry_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".to_string(),
            connection_timeout_seconds: 5,
            max_retry_attempts: 3,
            retry_delay_ms: 500,
        }
    }
}

impl RedisConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.url.starts_with("redis://") && !self.url.starts_with("rediss://") {
            return Err(anyhow::anyhow!("无效的Redis地址: {}", self.url));
        }
        if self.max_retry_attempts == 0 {
            return Err(anyhow::anyhow!("Redis最大重试次数必须大于0"));
        }
        Ok(())
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// 队列配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub name: String,
    /// 任务载荷的存活时间
    pub job_ttl_seconds: u64,
    /// 处理中任务的租约时长，超时后由恢复服务放回队列
    pub visibility_timeout_seconds: u64,
    pub default_max_retries: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "job_queue".to_string(),
            job_ttl_seconds: 24 * 3600,
            visibility_timeout_seconds: 600,
            default_max_retries: 3,
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.is_empty() || self.name.contains(char::is_whitespace) {
            return Err(anyhow::anyhow!("无效的队列名称: '{}'", self.name));
        }
        if self.job_ttl_seconds == 0 {
            return Err(anyhow::anyhow!("任务存活时间必须大于0"));
        }
        if self.visibility_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("租约时长必须大于0"));
        }
        Ok(())
    }

    pub fn job_ttl(&self) -> Duration {
        Duration::from_secs(self.job_ttl_seconds)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_seconds)
    }
}

/// 工作池配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub poll_interval_ms: u64,
    pub job_timeout_seconds: u64,
    pub shutdown_timeout_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            poll_interval_ms: 1000,
            job_timeout_seconds: 300,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.concurrency == 0 {
            return Err(anyhow::anyhow!("并发数必须大于0"));
        }
        if self.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("轮询间隔必须大于0"));
        }
        if self.job_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("任务超时时间必须大于0"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_seconds)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

/// 调度器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub tick_interval_seconds: u64,
    /// 启动时安装默认定时任务模板
    pub install_defaults: bool,
    pub shutdown_timeout_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval_seconds: 60,
            install_defaults: true,
            shutdown_timeout_seconds: 10,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tick_interval_seconds == 0 {
            return Err(anyhow::anyhow!("调度间隔必须大于0"));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_seconds)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

/// 去重配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub enabled: bool,
    pub key_prefix: String,
    pub window_seconds: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            key_prefix: "job".to_string(),
            window_seconds: 15 * 60,
        }
    }
}

impl DedupConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.key_prefix.is_empty() {
            return Err(anyhow::anyhow!("去重键前缀不能为空"));
        }
        if self.window_seconds == 0 {
            return Err(anyhow::anyhow!("去重窗口必须大于0"));
        }
        Ok(())
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

/// 告警阈值
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlertThresholds {
    pub failure_rate: f64,
    pub min_processed_for_failure_rate: u64,
    pub max_processing: u64,
    pub max_queue_depth: u64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            failure_rate: 0.2,
            min_processed_for_failure_rate: 10,
            max_processing: 10,
            max_queue_depth: 100,
        }
    }
}

impl AlertThresholds {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(anyhow::anyhow!(
                "失败率阈值必须在0到1之间: {}",
                self.failure_rate
            ));
        }
        Ok(())
    }
}

/// 指标配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 内存中保留的执行记录条数
    pub history_size: usize,
    pub persist_history: bool,
    pub history_ttl_days: u64,
    /// 存储中时间线保留的最大条数
    pub history_store_limit: u64,
    pub alerts: AlertThresholds,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            history_size: 1000,
            persist_history: true,
            history_ttl_days: 7,
            history_store_limit: 10_000,
            alerts: AlertThresholds::default(),
        }
    }
}

impl MetricsConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.history_size == 0 {
            return Err(anyhow::anyhow!("执行历史容量必须大于0"));
        }
        if self.history_store_limit == 0 {
            return Err(anyhow::anyhow!("存储历史上限必须大于0"));
        }
        self.alerts.validate()
    }

    pub fn history_ttl(&self) -> Duration {
        Duration::from_secs(self.history_ttl_days * 24 * 3600)
    }
}

/// 维护任务配置：重试提升、租约回收、优先级调整、自动清理
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub enabled: bool,
    pub recovery_interval_seconds: u64,
    /// 0 表示关闭自动优先级调整
    pub priority_adjust_interval_seconds: u64,
    /// 为空表示关闭自动清理
    pub auto_purge_retention_hours: Option<u64>,
    pub auto_purge_interval_seconds: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            recovery_interval_seconds: 30,
            priority_adjust_interval_seconds: 300,
            auto_purge_retention_hours: None,
            auto_purge_interval_seconds: 3600,
        }
    }
}

impl MaintenanceConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.recovery_interval_seconds == 0 {
            return Err(anyhow::anyhow!("恢复间隔必须大于0"));
        }
        match self.auto_purge_retention_hours {
            Some(0) => return Err(anyhow::anyhow!("自动清理保留时长必须大于0")),
            Some(hours) if hours > crate::MAX_RETENTION_HOURS => {
                return Err(anyhow::anyhow!(
                    "自动清理保留时长不能超过{}小时",
                    crate::MAX_RETENTION_HOURS
                ))
            }
            _ => {}
        }
        if self.auto_purge_interval_seconds == 0 {
            return Err(anyhow::anyhow!("自动清理间隔必须大于0"));
        }
        Ok(())
    }

    pub fn recovery_interval(&self) -> Duration {
        Duration::from_secs(self.recovery_interval_seconds)
    }

    pub fn priority_adjust_interval(&self) -> Option<Duration> {
        match self.priority_adjust_interval_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn auto_purge_interval(&self) -> Duration {
        Duration::from_secs(self.auto_purge_interval_seconds)
    }
}

/// 管理接口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind_address: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

impl ApiConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.enabled && self.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(anyhow::anyhow!("无效的监听地址: {}", self.bind_address));
        }
        Ok(())
    }
}

/// 可观测性配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// "json" 或 "pretty"
    pub log_format: String,
    /// Prometheus导出监听地址，为空表示不启动导出器
    pub prometheus_listen: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            prometheus_listen: None,
        }
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(anyhow::anyhow!(
                "无效的日志级别: {}，支持的级别: {:?}",
                self.log_level,
                valid_levels
            ));
        }
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.as_str()) {
            return Err(anyhow::anyhow!("无效的日志格式: {}", self.log_format));
        }
        if let Some(addr) = &self.prometheus_listen {
            addr.parse::<std::net::SocketAddr>()
                .map_err(|_| anyhow::anyhow!("无效的Prometheus监听地址: {addr}"))?;
        }
        Ok(())
    }
}
