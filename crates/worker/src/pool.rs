use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use fleet_jobs_core::config::WorkerConfig;
use fleet_jobs_core::models::{ExecutionRecord, Job, JobStatus};
use fleet_jobs_core::traits::HandlerOutput;
use fleet_jobs_core::{JobError, JobResult};
use fleet_jobs_infrastructure::{JobMetricsCollector, JobQueue, StructuredLogger};

use crate::registry::HandlerRegistry;

/// 缺少处理器时写入任务的错误信息
pub const NO_HANDLER_ERROR: &str = "no handler";

/// 工作池累计统计
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct PoolStats {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub total_duration_ms: u64,
    pub avg_duration_ms: f64,
    pub min_duration_ms: Option<u64>,
    pub max_duration_ms: Option<u64>,
}

impl PoolStats {
    fn record(&mut self, success: bool, duration_ms: u64) {
        self.processed += 1;
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.total_duration_ms += duration_ms;
        self.avg_duration_ms = self.total_duration_ms as f64 / self.processed as f64;
        self.min_duration_ms = Some(self.min_duration_ms.map_or(duration_ms, |m| m.min(duration_ms)));
        self.max_duration_ms = Some(self.max_duration_ms.map_or(duration_ms, |m| m.max(duration_ms)));
    }
}

/// 丢弃时终止处理器任务，超时或工作协程被终止时不会遗留执行
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

struct PoolInner {
    queue: JobQueue,
    registry: Arc<HandlerRegistry>,
    metrics: Option<Arc<JobMetricsCollector>>,
    poll_interval: Duration,
    job_timeout: Duration,
    stats: RwLock<PoolStats>,
}

impl PoolInner {
    /// 执行一个已领取的任务并写回结果
    async fn process(&self, job: Job, worker_id: &str) {
        let started_at = Utc::now();
        let job_id = job.id.clone();

        let outcome: Result<HandlerOutput, String> = match self.registry.get(job.job_type()).await {
            None => {
                warn!("任务类型 {} 没有注册处理器: {}", job.job_type(), job_id);
                Err(NO_HANDLER_ERROR.to_string())
            }
            Some(handler) => {
                let mut task = AbortOnDrop(tokio::spawn(async move { handler.handle(&job).await }));
                match tokio::time::timeout(self.job_timeout, &mut task.0).await {
                    Ok(Ok(Ok(output))) => Ok(output),
                    Ok(Ok(Err(e))) => Err(e.to_string()),
                    Ok(Err(join_error)) if join_error.is_panic() => {
                        let message = panic_message(join_error.into_panic());
                        error!("任务处理器崩溃: {} - {}", job_id, message);
                        Err(format!("handler panicked: {message}"))
                    }
                    Ok(Err(join_error)) => Err(format!("handler task cancelled: {join_error}")),
                    Err(_) => {
                        task.0.abort();
                        let err = JobError::ExecutionTimeout {
                            timeout_seconds: self.job_timeout.as_secs(),
                        };
                        warn!("任务执行超时: {} ({:?})", job_id, self.job_timeout);
                        Err(err.to_string())
                    }
                }
            }
        };

        let finished = match &outcome {
            Ok(output) => self.queue.complete(&job_id, output.clone()).await,
            Err(message) => self.queue.fail(&job_id, message).await,
        };
        let finished_at = Utc::now();

        match finished {
            Ok(job) => self.report(&job, worker_id, started_at, finished_at).await,
            Err(JobError::InvalidStateTransition { status, .. }) => {
                // 租约已被回收，结果以重新领取的执行为准
                warn!("任务 {} 已不在处理中（当前 {}），丢弃本次结果", job_id, status);
            }
            Err(e) => error!("写回任务 {} 结果失败: {}", job_id, e),
        }
    }

    async fn report(
        &self,
        job: &Job,
        worker_id: &str,
        started_at: chrono::DateTime<Utc>,
        finished_at: chrono::DateTime<Utc>,
    ) {
        let record = ExecutionRecord::from_job(job, worker_id, started_at, finished_at);
        let success = record.is_success();
        if success {
            StructuredLogger::log_job_completed(job, worker_id, record.duration_ms);
        }

        self.stats.write().await.record(success, record.duration_ms);
        if let Some(metrics) = &self.metrics {
            metrics.record_execution(record).await;
        }
    }
}

async fn run_worker(
    inner: Arc<PoolInner>,
    worker_id: String,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    debug!("工作协程启动: {}", worker_id);
    loop {
        match shutdown_rx.try_recv() {
            Err(TryRecvError::Empty) => {}
            _ => break,
        }

        match inner.queue.dequeue().await {
            Ok(Some(job)) => {
                inner.process(job, &worker_id).await;
                continue;
            }
            Ok(None) => {}
            Err(e) => warn!("工作协程 {} 领取任务失败: {}", worker_id, e),
        }

        tokio::select! {
            _ = tokio::time::sleep(inner.poll_interval) => {}
            _ = shutdown_rx.recv() => break,
        }
    }
    debug!("工作协程退出: {}", worker_id);
}

/// 工作池构建器
pub struct WorkerPoolBuilder {
    queue: JobQueue,
    registry: Arc<HandlerRegistry>,
    metrics: Option<Arc<JobMetricsCollector>>,
    concurrency: usize,
    poll_interval: Duration,
    job_timeout: Duration,
    shutdown_timeout: Duration,
    hostname: String,
}

impl WorkerPoolBuilder {
    pub fn new(queue: JobQueue, registry: Arc<HandlerRegistry>) -> Self {
        let defaults = WorkerConfig::default();
        Self {
            queue,
            registry,
            metrics: None,
            concurrency: defaults.concurrency,
            poll_interval: defaults.poll_interval(),
            job_timeout: defaults.job_timeout(),
            shutdown_timeout: defaults.shutdown_timeout(),
            hostname: hostname::get()
                .unwrap_or_else(|_| "unknown".into())
                .to_string_lossy()
                .to_string(),
        }
    }

    /// 应用配置文件中的工作池参数
    pub fn config(self, config: &WorkerConfig) -> Self {
        self.concurrency(config.concurrency)
            .poll_interval(config.poll_interval())
            .job_timeout(config.job_timeout())
            .shutdown_timeout(config.shutdown_timeout())
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn job_timeout(mut self, job_timeout: Duration) -> Self {
        self.job_timeout = job_timeout;
        self
    }

    pub fn shutdown_timeout(mut self, shutdown_timeout: Duration) -> Self {
        self.shutdown_timeout = shutdown_timeout;
        self
    }

    pub fn metrics(mut self, metrics: Arc<JobMetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn build(self) -> WorkerPool {
        WorkerPool {
            inner: Arc::new(PoolInner {
                queue: self.queue,
                registry: self.registry,
                metrics: self.metrics,
                poll_interval: self.poll_interval,
                job_timeout: self.job_timeout,
                stats: RwLock::new(PoolStats::default()),
            }),
            concurrency: self.concurrency,
            shutdown_timeout: self.shutdown_timeout,
            hostname: self.hostname,
            handles: Mutex::new(Vec::new()),
            shutdown_tx: RwLock::new(None),
            is_running: RwLock::new(false),
        }
    }
}

/// 并发工作池
///
/// 每个工作协程循环领取任务，处理器在独立任务中执行并受超时约束。
/// 停止时不再领取新任务，等待进行中的任务至多 `shutdown_timeout`，
/// 之后终止剩余任务；这些任务在存储中保持处理中，由租约回收放回队列。
pub struct WorkerPool {
    inner: Arc<PoolInner>,
    concurrency: usize,
    shutdown_timeout: Duration,
    hostname: String,
    handles: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: RwLock<Option<broadcast::Sender<()>>>,
    is_running: RwLock<bool>,
}

impl WorkerPool {
    pub fn builder(queue: JobQueue, registry: Arc<HandlerRegistry>) -> WorkerPoolBuilder {
        WorkerPoolBuilder::new(queue, registry)
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn registry(&self) -> Arc<HandlerRegistry> {
        Arc::clone(&self.inner.registry)
    }

    pub fn worker_ids(&self) -> Vec<String> {
        (1..=self.concurrency)
            .map(|n| format!("{}-worker-{}", self.hostname, n))
            .collect()
    }

    pub async fn stats(&self) -> PoolStats {
        self.inner.stats.read().await.clone()
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// 执行单个任务，不经过工作协程
    pub async fn run_job(&self, job: Job, worker_id: &str) -> JobResult<()> {
        if job.status != JobStatus::Processing {
            return Err(JobError::InvalidStateTransition {
                id: job.id,
                status: job.status,
                operation: "execute",
            });
        }
        self.inner.process(job, worker_id).await;
        Ok(())
    }

    pub async fn start(&self) -> JobResult<()> {
        let mut is_running = self.is_running.write().await;
        if *is_running {
            return Err(JobError::AlreadyRunning("worker pool"));
        }

        let (shutdown_tx, _) = broadcast::channel(1);
        let mut handles = self.handles.lock().await;
        for worker_id in self.worker_ids() {
            let inner = Arc::clone(&self.inner);
            let shutdown_rx = shutdown_tx.subscribe();
            handles.push(tokio::spawn(run_worker(inner, worker_id, shutdown_rx)));
        }
        *self.shutdown_tx.write().await = Some(shutdown_tx);

        *is_running = true;
        info!(
            "工作池启动: {} 个工作协程, 任务超时 {:?}",
            self.concurrency, self.inner.job_timeout
        );
        Ok(())
    }

    pub async fn stop(&self) -> JobResult<()> {
        let mut is_running = self.is_running.write().await;
        if !*is_running {
            return Ok(());
        }

        if let Some(shutdown_tx) = self.shutdown_tx.write().await.take() {
            let _ = shutdown_tx.send(());
        }

        let handles: Vec<JoinHandle<()>> = self.handles.lock().await.drain(..).collect();
        let abort_handles: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        if tokio::time::timeout(self.shutdown_timeout, futures::future::join_all(handles))
            .await
            .is_err()
        {
            warn!(
                "工作池未在 {:?} 内完成进行中的任务，强制终止",
                self.shutdown_timeout
            );
            for handle in abort_handles {
                handle.abort();
            }
        }

        *is_running = false;
        info!("工作池已停止");
        Ok(())
    }
}
