//! Persisted key layout
//!
//! The layout is shared with operability tooling, so names here are part of
//! the on-store format.

use fleet_jobs_core::models::JobStatus;

/// Prefix of persisted scheduled job templates (`scheduled_job:{id}`)
pub const SCHEDULED_JOB_PREFIX: &str = "scheduled_job:";

/// Prefix of persisted execution records (`job:history:{id}`)
pub const HISTORY_PREFIX: &str = "job:history:";

/// Sorted set of execution record ids scored by finish time
pub const HISTORY_TIMELINE: &str = "job:history:timeline";

pub fn scheduled_job_key(id: &str) -> String {
    format!("{SCHEDULED_JOB_PREFIX}{id}")
}

pub fn history_key(job_id: &str) -> String {
    format!("{HISTORY_PREFIX}{job_id}")
}

pub fn dedup_key(prefix: &str, fingerprint: &str) -> String {
    format!("{prefix}:dedup:{fingerprint}")
}

/// Keys owned by a single named queue
#[derive(Debug, Clone)]
pub struct QueueKeys {
    pub ready: String,
    pub delayed: String,
    pub processing: String,
    pub completed: String,
    pub failed: String,
    pub cancelled: String,
    pub sequence: String,
    job_prefix: String,
}

impl QueueKeys {
    pub fn new(queue_name: &str) -> Self {
        Self {
            ready: queue_name.to_string(),
            delayed: format!("{queue_name}:delayed"),
            processing: format!("{queue_name}:processing"),
            completed: format!("{queue_name}:completed"),
            failed: format!("{queue_name}:failed"),
            cancelled: format!("{queue_name}:cancelled"),
            sequence: format!("{queue_name}:seq"),
            job_prefix: format!("{queue_name}:job:"),
        }
    }

    pub fn job(&self, id: &str) -> String {
        format!("{}{}", self.job_prefix, id)
    }

    /// Sorted set that indexes jobs in the given status
    pub fn index_for(&self, status: JobStatus) -> &str {
        match status {
            JobStatus::Pending => &self.ready,
            JobStatus::Retrying => &self.delayed,
            JobStatus::Processing => &self.processing,
            JobStatus::Completed => &self.completed,
            JobStatus::Failed => &self.failed,
            JobStatus::Cancelled => &self.cancelled,
        }
    }
}
