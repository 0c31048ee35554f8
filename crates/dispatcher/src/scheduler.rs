use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use fleet_jobs_core::models::{
    AggregationPeriod, AnalyticsAggregationData, DataCleanupData, InvoiceGenerationData, Job,
    JobPayload, JobPriority, NotificationChannel, NotificationData, ReportFormat,
    ReportGenerationData, ReportType, ScheduledJob,
};
use fleet_jobs_core::traits::JobStore;
use fleet_jobs_core::{JobError, JobResult};
use fleet_jobs_infrastructure::keys::{scheduled_job_key, SCHEDULED_JOB_PREFIX};
use fleet_jobs_infrastructure::{JobMetricsCollector, JobQueue, StructuredLogger};

use crate::schedule_utils::Schedule;

/// 默认的定时任务模板
pub fn default_templates() -> Vec<ScheduledJob> {
    vec![
        ScheduledJob::new(
            "daily_analytics_aggregation",
            "每日分析数据聚合",
            JobPayload::AnalyticsAggregation(AnalyticsAggregationData {
                period: AggregationPeriod::Daily,
                metrics: vec![
                    "mileage".to_string(),
                    "fuel_consumption".to_string(),
                    "utilization".to_string(),
                ],
            }),
            "@daily",
        )
        .with_priority(JobPriority::LOW),
        ScheduledJob::new(
            "monthly_invoicing",
            "月度发票生成",
            JobPayload::InvoiceGeneration(InvoiceGenerationData {
                billing_period: None,
                company_ids: Vec::new(),
                send_email: true,
            }),
            "@monthly",
        )
        .with_priority(JobPriority::HIGH),
        ScheduledJob::new(
            "weekly_cleanup",
            "每周数据清理",
            JobPayload::DataCleanup(DataCleanupData::default()),
            "@weekly",
        )
        .with_priority(JobPriority::LOW),
        ScheduledJob::new(
            "daily_fleet_report",
            "每日车队报表",
            JobPayload::ReportGeneration(ReportGenerationData {
                report_type: ReportType::Fleet,
                format: ReportFormat::Pdf,
                ..Default::default()
            }),
            "@daily",
        ),
        ScheduledJob::new(
            "hourly_notifications",
            "每小时通知汇总",
            JobPayload::Notification(NotificationData {
                channel: NotificationChannel::InApp,
                recipients: Vec::new(),
                subject: "fleet status digest".to_string(),
                message: "hourly fleet status digest".to_string(),
            }),
            "@hourly",
        ),
    ]
}

/// 定时任务调度器
///
/// 模板保存在一把互斥锁下，并持久化到 `scheduled_job:{id}`。
/// 每次触发后 `next_run` 从当前时间重新计算，延迟的触发不会补执行。
/// 锁不会跨存储调用持有。
pub struct JobScheduler {
    queue: JobQueue,
    store: Arc<dyn JobStore>,
    templates: Mutex<HashMap<String, ScheduledJob>>,
    metrics: Option<Arc<JobMetricsCollector>>,
    tick_interval: Duration,
    shutdown_timeout: Duration,
    shutdown_tx: RwLock<Option<broadcast::Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    is_running: RwLock<bool>,
}

impl JobScheduler {
    pub fn new(queue: JobQueue, tick_interval: Duration) -> Self {
        let store = queue.store();
        Self {
            queue,
            store,
            templates: Mutex::new(HashMap::new()),
            metrics: None,
            tick_interval,
            shutdown_timeout: Duration::from_secs(10),
            shutdown_tx: RwLock::new(None),
            handle: Mutex::new(None),
            is_running: RwLock::new(false),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<JobMetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_shutdown_timeout(mut self, shutdown_timeout: Duration) -> Self {
        self.shutdown_timeout = shutdown_timeout;
        self
    }

    async fn persist(&self, template: &ScheduledJob) -> JobResult<()> {
        let json = serde_json::to_string(template)?;
        self.store
            .set(&scheduled_job_key(&template.id), &json, None)
            .await
    }

    /// 注册定时任务模板
    ///
    /// 调度表达式无法解析时注册失败；同ID的模板会被覆盖。
    pub async fn register(&self, mut template: ScheduledJob) -> JobResult<ScheduledJob> {
        if template.id.is_empty() {
            template.id = uuid::Uuid::new_v4().to_string();
        }
        let schedule = Schedule::parse(&template.schedule)?;
        template.next_run = schedule.next_run(Utc::now())?;

        self.persist(&template).await?;
        self.templates
            .lock()
            .await
            .insert(template.id.clone(), template.clone());

        info!(
            "注册定时任务: {} ({}), 下次执行: {}",
            template.id, template.schedule, template.next_run
        );
        Ok(template)
    }

    pub async fn unregister(&self, id: &str) -> JobResult<()> {
        let removed = self.templates.lock().await.remove(id);
        if removed.is_none() {
            return Err(JobError::ScheduledJobNotFound { id: id.to_string() });
        }
        self.store.delete(&scheduled_job_key(id)).await?;
        info!("注销定时任务: {}", id);
        Ok(())
    }

    pub async fn set_active(&self, id: &str, active: bool) -> JobResult<ScheduledJob> {
        let updated = {
            let mut templates = self.templates.lock().await;
            let template = templates
                .get_mut(id)
                .ok_or_else(|| JobError::ScheduledJobNotFound { id: id.to_string() })?;
            template.is_active = active;
            template.clone()
        };
        self.persist(&updated).await?;
        Ok(updated)
    }

    pub async fn get(&self, id: &str) -> Option<ScheduledJob> {
        self.templates.lock().await.get(id).cloned()
    }

    pub async fn list(&self) -> Vec<ScheduledJob> {
        let mut templates: Vec<ScheduledJob> =
            self.templates.lock().await.values().cloned().collect();
        templates.sort_by(|a, b| a.id.cmp(&b.id));
        templates
    }

    /// 从存储中恢复模板
    pub async fn load_from_store(&self) -> JobResult<usize> {
        let keys = self.store.scan_prefix(SCHEDULED_JOB_PREFIX).await?;
        let mut loaded = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(json) = self.store.get(&key).await? else {
                continue;
            };
            match serde_json::from_str::<ScheduledJob>(&json) {
                Ok(template) => loaded.push(template),
                Err(e) => warn!("跳过无法解析的定时任务 {}: {}", key, e),
            }
        }

        let count = loaded.len();
        let mut templates = self.templates.lock().await;
        for template in loaded {
            templates.insert(template.id.clone(), template);
        }
        info!("从存储恢复 {} 个定时任务", count);
        Ok(count)
    }

    /// 安装尚未注册的默认模板，返回新安装的数量
    pub async fn install_defaults(&self) -> JobResult<usize> {
        let mut installed = 0;
        for template in default_templates() {
            if self.get(&template.id).await.is_some() {
                continue;
            }
            self.register(template).await?;
            installed += 1;
        }
        Ok(installed)
    }

    /// 触发所有到期的模板，返回生成的任务
    pub async fn run_due_jobs(&self, now: DateTime<Utc>) -> JobResult<Vec<Job>> {
        let due: Vec<ScheduledJob> = self
            .templates
            .lock()
            .await
            .values()
            .filter(|t| t.is_due(now))
            .cloned()
            .collect();

        let mut enqueued = Vec::with_capacity(due.len());
        for mut template in due {
            let job = match self.queue.enqueue(template.materialize()).await {
                Ok(job) => job,
                Err(e) => {
                    error!("定时任务 {} 入队失败: {}", template.id, e);
                    continue;
                }
            };
            if let Some(metrics) = &self.metrics {
                metrics.record_enqueued(job.job_type()).await;
            }

            let next_run = match Schedule::parse(&template.schedule).and_then(|s| s.next_run(now)) {
                Ok(next_run) => next_run,
                Err(e) => {
                    // 无法解析的模板停用，避免每个周期重复触发
                    error!("定时任务 {} 调度表达式失效，已停用: {}", template.id, e);
                    template.is_active = false;
                    template.next_run
                }
            };
            template.last_run = Some(now);
            template.next_run = next_run;

            {
                let mut templates = self.templates.lock().await;
                if let Some(current) = templates.get_mut(&template.id) {
                    current.last_run = template.last_run;
                    current.next_run = template.next_run;
                    current.is_active = current.is_active && template.is_active;
                }
            }
            if let Err(e) = self.persist(&template).await {
                warn!("定时任务 {} 状态持久化失败: {}", template.id, e);
            }

            StructuredLogger::log_scheduled_job_fired(&template, &job.id);
            enqueued.push(job);
        }

        Ok(enqueued)
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// 启动调度循环
    pub async fn start(self: &Arc<Self>) -> JobResult<()> {
        let mut is_running = self.is_running.write().await;
        if *is_running {
            return Err(JobError::AlreadyRunning("scheduler"));
        }

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        *self.shutdown_tx.write().await = Some(shutdown_tx);

        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(scheduler.tick_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match scheduler.run_due_jobs(Utc::now()).await {
                            Ok(jobs) if !jobs.is_empty() => debug!("本轮触发 {} 个定时任务", jobs.len()),
                            Ok(_) => {}
                            Err(e) => error!("定时任务调度失败: {}", e),
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("调度器收到停止信号");
                        break;
                    }
                }
            }
        });
        *self.handle.lock().await = Some(handle);

        *is_running = true;
        info!("调度器启动，间隔: {:?}", self.tick_interval);
        Ok(())
    }

    /// 停止调度循环，等待当前一轮结束
    pub async fn stop(&self) -> JobResult<()> {
        let mut is_running = self.is_running.write().await;
        if !*is_running {
            return Ok(());
        }

        if let Some(shutdown_tx) = self.shutdown_tx.write().await.take() {
            let _ = shutdown_tx.send(());
        }

        if let Some(mut handle) = self.handle.lock().await.take() {
            if tokio::time::timeout(self.shutdown_timeout, &mut handle)
                .await
                .is_err()
            {
                warn!("调度器未在 {:?} 内停止，强制终止", self.shutdown_timeout);
                handle.abort();
            }
        }

        *is_running = false;
        info!("调度器已停止");
        Ok(())
    }
}
