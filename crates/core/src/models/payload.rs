use std::fmt;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::JobResult;

/// 任务类型
///
/// 封闭集合，处理器注册和分发都以此为键，新增类型时编译器会检查
/// 所有 `match` 是否完整。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    ReportGeneration,
    InvoiceGeneration,
    DataCleanup,
    Notification,
    AnalyticsAggregation,
}

impl JobType {
    pub const ALL: [JobType; 5] = [
        JobType::ReportGeneration,
        JobType::InvoiceGeneration,
        JobType::DataCleanup,
        JobType::Notification,
        JobType::AnalyticsAggregation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::ReportGeneration => "report_generation",
            JobType::InvoiceGeneration => "invoice_generation",
            JobType::DataCleanup => "data_cleanup",
            JobType::Notification => "notification",
            JobType::AnalyticsAggregation => "analytics_aggregation",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("未知的任务类型: {s}"))
    }
}

/// 类型化的任务载荷
///
/// 序列化格式为 `{"type": "data_cleanup", "data": {...}}`。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum JobPayload {
    ReportGeneration(ReportGenerationData),
    InvoiceGeneration(InvoiceGenerationData),
    DataCleanup(DataCleanupData),
    Notification(NotificationData),
    AnalyticsAggregation(AnalyticsAggregationData),
}

impl JobPayload {
    pub fn job_type(&self) -> JobType {
        match self {
            JobPayload::ReportGeneration(_) => JobType::ReportGeneration,
            JobPayload::InvoiceGeneration(_) => JobType::InvoiceGeneration,
            JobPayload::DataCleanup(_) => JobType::DataCleanup,
            JobPayload::Notification(_) => JobType::Notification,
            JobPayload::AnalyticsAggregation(_) => JobType::AnalyticsAggregation,
        }
    }

    /// 载荷数据部分的规范化JSON，用于计算指纹
    pub fn canonical_data(&self) -> JobResult<String> {
        let json = match self {
            JobPayload::ReportGeneration(d) => serde_json::to_string(d)?,
            JobPayload::InvoiceGeneration(d) => serde_json::to_string(d)?,
            JobPayload::DataCleanup(d) => serde_json::to_string(d)?,
            JobPayload::Notification(d) => serde_json::to_string(d)?,
            JobPayload::AnalyticsAggregation(d) => serde_json::to_string(d)?,
        };
        Ok(json)
    }
}

/// 载荷数据与任务类型的静态绑定
pub trait JobData: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const JOB_TYPE: JobType;

    fn from_payload(payload: &JobPayload) -> Option<&Self>;

    fn into_payload(self) -> JobPayload;
}

macro_rules! impl_job_data {
    ($data:ty, $variant:ident) => {
        impl JobData for $data {
            const JOB_TYPE: JobType = JobType::$variant;

            fn from_payload(payload: &JobPayload) -> Option<&Self> {
                match payload {
                    JobPayload::$variant(data) => Some(data),
                    _ => None,
                }
            }

            fn into_payload(self) -> JobPayload {
                JobPayload::$variant(self)
            }
        }

        impl From<$data> for JobPayload {
            fn from(data: $data) -> Self {
                JobPayload::$variant(data)
            }
        }
    };
}

impl_job_data!(ReportGenerationData, ReportGeneration);
impl_job_data!(InvoiceGenerationData, InvoiceGeneration);
impl_job_data!(DataCleanupData, DataCleanup);
impl_job_data!(NotificationData, Notification);
impl_job_data!(AnalyticsAggregationData, AnalyticsAggregation);

/// 报表生成
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReportGenerationData {
    pub report_type: ReportType,
    pub format: ReportFormat,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    #[serde(default)]
    pub vehicle_ids: Vec<i64>,
    #[serde(default)]
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    #[default]
    Fleet,
    Vehicle,
    Driver,
    Fuel,
    Maintenance,
    Financial,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    #[default]
    Pdf,
    Csv,
    Xlsx,
}

/// 发票生成
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InvoiceGenerationData {
    /// 账期，格式 `YYYY-MM`；为空表示上一个自然月
    pub billing_period: Option<String>,
    #[serde(default)]
    pub company_ids: Vec<i64>,
    #[serde(default)]
    pub send_email: bool,
}

/// 数据清理
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataCleanupData {
    pub retention_days: u32,
    pub targets: Vec<CleanupTarget>,
}

impl Default for DataCleanupData {
    fn default() -> Self {
        Self {
            retention_days: 30,
            targets: vec![
                CleanupTarget::CompletedJobs,
                CleanupTarget::FailedJobs,
                CleanupTarget::CancelledJobs,
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CleanupTarget {
    CompletedJobs,
    FailedJobs,
    CancelledJobs,
}

/// 通知发送
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NotificationData {
    pub channel: NotificationChannel,
    #[serde(default)]
    pub recipients: Vec<String>,
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Email,
    Sms,
    Push,
    #[default]
    InApp,
}

/// 分析数据聚合
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnalyticsAggregationData {
    pub period: AggregationPeriod,
    #[serde(default)]
    pub metrics: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AggregationPeriod {
    Hourly,
    #[default]
    Daily,
    Weekly,
    Monthly,
}
