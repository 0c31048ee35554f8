//! Mock job handlers for testing
//!
//! Handlers with scripted outcomes so tests can drive the worker pool
//! through success, failure, timeout and panic paths.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fleet_jobs_core::models::{Job, JobType};
use fleet_jobs_core::traits::{HandlerOutput, JobHandler};
use fleet_jobs_core::{JobError, JobResult};

/// Fails the first `failures` invocations, then succeeds
pub struct ScriptedHandler {
    job_type: JobType,
    failures: u32,
    calls: AtomicU32,
}

impl ScriptedHandler {
    pub fn new(job_type: JobType, failures: u32) -> Self {
        Self {
            job_type,
            failures,
            calls: AtomicU32::new(0),
        }
    }

    pub fn always_failing(job_type: JobType) -> Self {
        Self::new(job_type, u32::MAX)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobHandler for ScriptedHandler {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn handle(&self, _job: &Job) -> JobResult<HandlerOutput> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err(JobError::HandlerExecution(format!(
                "scripted failure {attempt}"
            )));
        }
        Ok(Some(serde_json::json!({ "attempt": attempt })))
    }
}

/// Records the ids of every job it handles, optionally after a delay
///
/// Also tracks how many invocations overlapped at the busiest moment.
#[derive(Clone)]
pub struct RecordingHandler {
    job_type: JobType,
    delay: Duration,
    seen: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<AtomicU32>,
    peak_in_flight: Arc<AtomicU32>,
}

impl RecordingHandler {
    pub fn new(job_type: JobType) -> Self {
        Self {
            job_type,
            delay: Duration::ZERO,
            seen: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicU32::new(0)),
            peak_in_flight: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Highest number of jobs handled at the same time
    pub fn peak_concurrency(&self) -> u32 {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobHandler for RecordingHandler {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn handle(&self, job: &Job) -> JobResult<HandlerOutput> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(job.id.clone());
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(None)
    }
}

/// Sleeps for a fixed time; `finished` only counts runs that were not aborted
pub struct SlowHandler {
    job_type: JobType,
    duration: Duration,
    finished: Arc<AtomicU32>,
}

impl SlowHandler {
    pub fn new(job_type: JobType, duration: Duration) -> Self {
        Self {
            job_type,
            duration,
            finished: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn finished(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.finished)
    }
}

#[async_trait]
impl JobHandler for SlowHandler {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn handle(&self, _job: &Job) -> JobResult<HandlerOutput> {
        tokio::time::sleep(self.duration).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }
}

/// Panics on every invocation
pub struct PanickingHandler {
    job_type: JobType,
}

impl PanickingHandler {
    pub fn new(job_type: JobType) -> Self {
        Self { job_type }
    }
}

#[async_trait]
impl JobHandler for PanickingHandler {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn handle(&self, job: &Job) -> JobResult<HandlerOutput> {
        panic!("handler panicked on job {}", job.id);
    }
}
