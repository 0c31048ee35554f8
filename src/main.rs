use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use fleet_jobs::{Application, ShutdownManager, StoreBackend};
use fleet_jobs_core::config::AppConfig;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 车队管理平台后台任务处理系统
#[derive(Debug, Parser)]
#[command(name = "fleet-jobs", version, about)]
struct Args {
    /// 配置文件路径，未指定时只使用默认值和环境变量
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// 使用进程内存储代替Redis
    #[arg(long)]
    memory: bool,

    /// 日志级别，覆盖配置文件
    #[arg(short, long, value_parser = ["trace", "debug", "info", "warn", "error"])]
    log_level: Option<String>,

    /// 日志格式，覆盖配置文件
    #[arg(long, value_parser = ["json", "pretty"])]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = AppConfig::load(args.config.as_deref()).with_context(|| match &args.config {
        Some(path) => format!("加载配置文件失败: {path}"),
        None => "加载配置失败".to_string(),
    })?;

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.observability.log_level);
    let log_format = args
        .log_format
        .as_deref()
        .unwrap_or(&config.observability.log_format);
    init_logging(log_level, log_format)?;

    info!("启动车队后台任务系统 v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &args.config {
        info!("配置文件: {path}");
    }

    if let Some(listen) = &config.observability.prometheus_listen {
        init_prometheus(listen)?;
    }

    let backend = if args.memory {
        StoreBackend::Memory
    } else {
        StoreBackend::Redis
    };
    let app = Arc::new(Application::new(config.clone(), backend).await?);

    let shutdown_manager = ShutdownManager::new();
    let app_handle = {
        let shutdown_rx = shutdown_manager.subscribe().await;
        let app = Arc::clone(&app);
        tokio::spawn(async move {
            if let Err(e) = app.run(shutdown_rx).await {
                error!("应用运行失败: {e:#}");
            }
        })
    };

    fleet_jobs::shutdown::wait_for_signal().await;
    info!("收到关闭信号，开始优雅关闭...");
    shutdown_manager.shutdown().await;

    // 工作池与调度器各自有停止超时，这里额外留出余量
    let grace = config.worker.shutdown_timeout()
        + config.scheduler.shutdown_timeout()
        + Duration::from_secs(5);
    match tokio::time::timeout(grace, app_handle).await {
        Ok(Ok(())) => info!("应用已优雅关闭"),
        Ok(Err(e)) => error!("应用关闭时发生错误: {e}"),
        Err(_) => warn!("应用关闭超时，强制退出"),
    }

    Ok(())
}

fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .context("初始化JSON日志格式失败")?,
        "pretty" => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .context("初始化Pretty日志格式失败")?,
        _ => return Err(anyhow::anyhow!("不支持的日志格式: {log_format}")),
    }

    Ok(())
}

fn init_prometheus(listen: &str) -> Result<()> {
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("无效的Prometheus监听地址: {listen}"))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("启动Prometheus导出器失败")?;
    info!("Prometheus指标导出在 http://{addr}/metrics");
    Ok(())
}
