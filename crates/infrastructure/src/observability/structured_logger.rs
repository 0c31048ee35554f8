//! Structured logging utilities
//!
//! Event-style logs for job lifecycle transitions. Every entry carries an
//! `event` field so log pipelines can filter on it.

use chrono::{DateTime, Utc};
use fleet_jobs_core::models::{FailureAlert, Job, ScheduledJob};
use tracing::{debug, error, info, warn};

/// Structured logging utilities
pub struct StructuredLogger;

impl StructuredLogger {
    /// Log job enqueued
    pub fn log_job_enqueued(job: &Job) {
        info!(
            event = "job_enqueued",
            job.id = %job.id,
            job.type = %job.job_type(),
            job.priority = job.priority.value(),
            job.sequence = job.sequence,
            job.company_id = ?job.company_id,
            "Job enqueued"
        );
    }

    /// Log job claimed by a worker
    pub fn log_job_dequeued(job: &Job) {
        debug!(
            event = "job_dequeued",
            job.id = %job.id,
            job.type = %job.job_type(),
            job.priority = job.priority.value(),
            job.retry_count = job.retry_count,
            "Job dequeued for processing"
        );
    }

    pub fn log_job_completed(job: &Job, worker_id: &str, duration_ms: u64) {
        info!(
            event = "job_completed",
            job.id = %job.id,
            job.type = %job.job_type(),
            worker.id = worker_id,
            duration_ms = duration_ms,
            "Job completed successfully"
        );
    }

    /// Log a failed attempt that will be retried after backoff
    pub fn log_job_retry_scheduled(job: &Job, due_at: DateTime<Utc>) {
        warn!(
            event = "job_retry_scheduled",
            job.id = %job.id,
            job.type = %job.job_type(),
            job.retry_count = job.retry_count,
            job.max_retries = job.max_retries,
            job.due_at = %due_at,
            error = job.error.as_deref().unwrap_or(""),
            "Job failed, retry scheduled"
        );
    }

    /// Log a job that exhausted its retries
    pub fn log_job_failed(job: &Job) {
        error!(
            event = "job_failed",
            job.id = %job.id,
            job.type = %job.job_type(),
            job.retry_count = job.retry_count,
            error = job.error.as_deref().unwrap_or(""),
            "Job failed permanently"
        );
    }

    pub fn log_job_cancelled(job: &Job) {
        info!(
            event = "job_cancelled",
            job.id = %job.id,
            job.type = %job.job_type(),
            "Job cancelled"
        );
    }

    /// Log operator-initiated retry
    pub fn log_job_requeued(job: &Job) {
        info!(
            event = "job_requeued",
            job.id = %job.id,
            job.type = %job.job_type(),
            job.priority = job.priority.value(),
            "Job manually requeued"
        );
    }

    /// Log a processing lease that expired and returned to the ready set
    pub fn log_lease_recovered(job: &Job, started_at: Option<DateTime<Utc>>) {
        warn!(
            event = "job_lease_recovered",
            job.id = %job.id,
            job.type = %job.job_type(),
            job.started_at = ?started_at,
            "Processing lease expired, job returned to queue"
        );
    }

    pub fn log_scheduled_job_fired(template: &ScheduledJob, job_id: &str) {
        info!(
            event = "scheduled_job_fired",
            scheduled_job.id = %template.id,
            scheduled_job.name = %template.name,
            job.id = job_id,
            job.type = %template.job_type(),
            scheduled_job.next_run = %template.next_run,
            "Scheduled job materialized"
        );
    }

    pub fn log_duplicate_rejected(job: &Job, fingerprint: &str) {
        warn!(
            event = "job_duplicate_rejected",
            job.type = %job.job_type(),
            job.company_id = ?job.company_id,
            fingerprint = fingerprint,
            "Duplicate job submission rejected"
        );
    }

    pub fn log_priorities_adjusted(scanned: usize, changed: usize) {
        info!(
            event = "priorities_adjusted",
            scanned = scanned,
            changed = changed,
            "Pending job priorities adjusted"
        );
    }

    pub fn log_jobs_purged(kind: &str, purged: u64, cutoff: DateTime<Utc>) {
        info!(
            event = "jobs_purged",
            kind = kind,
            purged = purged,
            cutoff = %cutoff,
            "Terminal jobs purged"
        );
    }

    pub fn log_alert(alert: &FailureAlert) {
        warn!(
            event = "job_alert",
            alert.kind = ?alert.kind,
            alert.severity = %alert.severity,
            alert.value = alert.value,
            alert.threshold = alert.threshold,
            "{}",
            alert.message
        );
    }
}
