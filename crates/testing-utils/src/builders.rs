//! Test data builders for creating test entities

use chrono::{DateTime, Utc};
use fleet_jobs_core::models::{
    DataCleanupData, Job, JobPayload, JobPriority, JobStatus, NotificationData,
    NotificationChannel, ReportGenerationData, ScheduledJob,
};

/// Builder for creating test Job entities
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new(payload: JobPayload) -> Self {
        Self {
            job: Job::new(payload),
        }
    }

    pub fn notification() -> Self {
        Self::new(JobPayload::Notification(NotificationData {
            channel: NotificationChannel::Email,
            recipients: vec!["dispatch@example.com".to_string()],
            subject: "test notification".to_string(),
            message: "vehicle 12 entered maintenance".to_string(),
        }))
    }

    pub fn data_cleanup() -> Self {
        Self::new(JobPayload::DataCleanup(DataCleanupData::default()))
    }

    pub fn report() -> Self {
        Self::new(JobPayload::ReportGeneration(ReportGenerationData::default()))
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.job.id = id.to_string();
        self
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.job = self.job.with_priority(priority);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.job.max_retries = max_retries;
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.job.retry_count = retry_count;
        self
    }

    pub fn with_company(mut self, company_id: i64) -> Self {
        self.job.company_id = Some(company_id);
        self
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.job.status = status;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.job.created_at = created_at;
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.job.tags.push(tag.to_string());
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}

/// Builder for creating test ScheduledJob templates
pub struct ScheduledJobBuilder {
    template: ScheduledJob,
}

impl ScheduledJobBuilder {
    pub fn new(id: &str, schedule: &str) -> Self {
        Self {
            template: ScheduledJob::new(
                id,
                format!("test template {id}"),
                JobPayload::Notification(NotificationData::default()),
                schedule,
            ),
        }
    }

    pub fn with_payload(mut self, payload: JobPayload) -> Self {
        self.template.payload = payload;
        self
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.template.priority = priority;
        self
    }

    pub fn with_company(mut self, company_id: i64) -> Self {
        self.template.company_id = Some(company_id);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.template.is_active = false;
        self
    }

    pub fn build(self) -> ScheduledJob {
        self.template
    }
}
