//! 应用配置
//!
//! 加载顺序：内置默认值 → TOML配置文件（可选）→ `FLEET_JOBS_` 前缀的环境变量。
//! 嵌套字段用双下划线分隔，例如 `FLEET_JOBS_WORKER__CONCURRENCY=8`。

mod models;

pub use models::*;

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

/// 环境变量前缀
pub const ENV_PREFIX: &str = "FLEET_JOBS";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub redis: RedisConfig,
    pub queue: QueueConfig,
    pub worker: WorkerConfig,
    pub scheduler: SchedulerConfig,
    pub dedup: DedupConfig,
    pub metrics: MetricsConfig,
    pub maintenance: MaintenanceConfig,
    pub api: ApiConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if !std::path::Path::new(path).exists() {
                return Err(anyhow::anyhow!("配置文件不存在: {path}"));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("构建配置失败")?;
        let app_config: AppConfig = config.try_deserialize().context("解析配置失败")?;

        app_config.validate().context("配置验证失败")?;

        Ok(app_config)
    }

    pub fn validate(&self) -> Result<()> {
        self.redis.validate().context("Redis配置验证失败")?;
        self.queue.validate().context("队列配置验证失败")?;
        self.worker.validate().context("工作池配置验证失败")?;
        self.scheduler.validate().context("调度器配置验证失败")?;
        self.dedup.validate().context("去重配置验证失败")?;
        self.metrics.validate().context("指标配置验证失败")?;
        self.maintenance.validate().context("维护任务配置验证失败")?;
        self.api.validate().context("接口配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        // 租约必须长于单个任务的执行超时，否则正常执行中的任务会被回收
        if self.queue.visibility_timeout_seconds <= self.worker.job_timeout_seconds {
            return Err(anyhow::anyhow!(
                "租约时长({}秒)必须大于任务超时时间({}秒)",
                self.queue.visibility_timeout_seconds,
                self.worker.job_timeout_seconds
            ));
        }

        Ok(())
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.queue.name, "job_queue");
        assert_eq!(config.worker.concurrency, 5);
        assert_eq!(config.dedup.window_seconds, 900);
        assert_eq!(config.metrics.history_size, 1000);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [worker]
            concurrency = 12

            [dedup]
            window_seconds = 60
            "#,
        )
        .unwrap();
        assert_eq!(config.worker.concurrency, 12);
        assert_eq!(config.worker.job_timeout_seconds, 300);
        assert_eq!(config.dedup.window_seconds, 60);
        assert_eq!(config.dedup.key_prefix, "job");
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = AppConfig::default();
        let toml_str = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&toml_str).unwrap();
        assert_eq!(parsed.queue.name, config.queue.name);
        assert_eq!(parsed.metrics.alerts, config.metrics.alerts);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = AppConfig::default();
        config.worker.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.queue.visibility_timeout_seconds = config.worker.job_timeout_seconds;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.observability.log_level = "verbose".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.metrics.alerts.failure_rate = 1.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.maintenance.auto_purge_retention_hours = Some(crate::MAX_RETENTION_HOURS + 1);
        assert!(config.validate().is_err());
        config.maintenance.auto_purge_retention_hours = Some(crate::MAX_RETENTION_HOURS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [queue]
            name = "fleet_jobs_test"

            [maintenance]
            auto_purge_retention_hours = 48
            "#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.queue.name, "fleet_jobs_test");
        assert_eq!(config.maintenance.auto_purge_retention_hours, Some(48));
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(AppConfig::load(Some("/nonexistent/fleet-jobs.toml")).is_err());
    }

    #[test]
    fn test_duration_accessors() {
        let config = AppConfig::default();
        assert_eq!(config.worker.poll_interval().as_millis(), 1000);
        assert_eq!(config.metrics.history_ttl().as_secs(), 7 * 24 * 3600);
        assert_eq!(
            config.maintenance.priority_adjust_interval().map(|d| d.as_secs()),
            Some(300)
        );
    }
}
