//! Job metrics collector
//!
//! Keeps counters, per-type breakdowns and a bounded execution history in
//! memory, persists execution records to the job store, and mirrors the
//! counters into the `metrics` facade for the Prometheus exporter.

use std::collections::{BTreeMap, VecDeque};
use std::fmt::Write as _;
use std::sync::Arc;

use chrono::Utc;
use fleet_jobs_core::config::MetricsConfig;
use fleet_jobs_core::models::{
    AlertKind, AlertSeverity, ExecutionRecord, FailureAlert, JobMetrics, JobStatus, JobType,
    JobTypeMetrics, QueueStats,
};
use fleet_jobs_core::traits::JobStore;
use fleet_jobs_core::JobResult;
use metrics::{counter, gauge, histogram};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::keys::{history_key, HISTORY_TIMELINE};

#[derive(Debug, Default, Clone)]
struct DurationStats {
    count: u64,
    total_ms: u64,
    min_ms: Option<u64>,
    max_ms: Option<u64>,
}

impl DurationStats {
    fn record(&mut self, duration_ms: u64) {
        self.count += 1;
        self.total_ms += duration_ms;
        self.min_ms = Some(self.min_ms.map_or(duration_ms, |m| m.min(duration_ms)));
        self.max_ms = Some(self.max_ms.map_or(duration_ms, |m| m.max(duration_ms)));
    }

    fn avg_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_ms as f64 / self.count as f64
        }
    }
}

#[derive(Debug, Default)]
struct TypeState {
    enqueued: u64,
    processed: u64,
    succeeded: u64,
    failed: u64,
    durations: DurationStats,
}

#[derive(Debug, Default)]
struct MetricsState {
    enqueued: u64,
    processed: u64,
    succeeded: u64,
    failed: u64,
    retried: u64,
    cancelled: u64,
    queue_depth: u64,
    processing: u64,
    durations: DurationStats,
    by_type: BTreeMap<JobType, TypeState>,
    history: VecDeque<ExecutionRecord>,
    last_updated: Option<chrono::DateTime<Utc>>,
}

/// Metrics collector for the job system
pub struct JobMetricsCollector {
    state: RwLock<MetricsState>,
    store: Option<Arc<dyn JobStore>>,
    config: MetricsConfig,
}

impl JobMetricsCollector {
    /// Collector that persists execution records to `store`
    pub fn new(store: Arc<dyn JobStore>, config: MetricsConfig) -> Self {
        let store = config.persist_history.then_some(store);
        Self {
            state: RwLock::new(MetricsState::default()),
            store,
            config,
        }
    }

    /// Collector that keeps everything in memory
    pub fn in_memory(config: MetricsConfig) -> Self {
        Self {
            state: RwLock::new(MetricsState::default()),
            store: None,
            config,
        }
    }

    pub async fn record_enqueued(&self, job_type: JobType) {
        {
            let mut state = self.state.write().await;
            state.enqueued += 1;
            state.by_type.entry(job_type).or_default().enqueued += 1;
            state.last_updated = Some(Utc::now());
        }
        counter!("fleet_jobs_enqueued_total", "job_type" => job_type.as_str()).increment(1);
    }

    pub async fn record_cancelled(&self, job_type: JobType) {
        {
            let mut state = self.state.write().await;
            state.cancelled += 1;
            state.last_updated = Some(Utc::now());
        }
        counter!("fleet_jobs_cancelled_total", "job_type" => job_type.as_str()).increment(1);
    }

    /// Record one execution outcome
    ///
    /// A `RETRYING` record counts as both a failure and a retry.
    pub async fn record_execution(&self, record: ExecutionRecord) {
        {
            let mut state = self.state.write().await;
            state.processed += 1;
            state.durations.record(record.duration_ms);
            match record.status {
                JobStatus::Completed => state.succeeded += 1,
                JobStatus::Retrying => {
                    state.failed += 1;
                    state.retried += 1;
                }
                _ => state.failed += 1,
            }

            let by_type = state.by_type.entry(record.job_type).or_default();
            by_type.processed += 1;
            by_type.durations.record(record.duration_ms);
            if record.is_success() {
                by_type.succeeded += 1;
            } else {
                by_type.failed += 1;
            }

            if state.history.len() >= self.config.history_size {
                state.history.pop_front();
            }
            state.history.push_back(record.clone());
            state.last_updated = Some(record.finished_at);
        }

        counter!(
            "fleet_jobs_executions_total",
            "job_type" => record.job_type.as_str(),
            "status" => record.status.as_str()
        )
        .increment(1);
        histogram!("fleet_jobs_execution_duration_seconds", "job_type" => record.job_type.as_str())
            .record(record.duration_ms as f64 / 1000.0);

        if let Err(e) = self.persist(&record).await {
            debug!("Dropping execution record for job {}: {}", record.job_id, e);
        }
    }

    async fn persist(&self, record: &ExecutionRecord) -> JobResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let json = serde_json::to_string(record)?;
        store
            .set(
                &history_key(&record.job_id),
                &json,
                Some(self.config.history_ttl()),
            )
            .await?;
        store
            .zadd(
                HISTORY_TIMELINE,
                &record.job_id,
                record.finished_at.timestamp_millis() as f64,
            )
            .await?;
        let keep = self.config.history_store_limit as i64;
        store.zremrange_by_rank(HISTORY_TIMELINE, 0, -(keep + 1)).await?;
        Ok(())
    }

    pub async fn update_queue_gauges(&self, stats: &QueueStats) {
        {
            let mut state = self.state.write().await;
            state.queue_depth = stats.depth();
            state.processing = stats.processing;
        }
        gauge!("fleet_jobs_queue_depth").set(stats.depth() as f64);
        gauge!("fleet_jobs_processing").set(stats.processing as f64);
    }

    pub async fn metrics(&self) -> JobMetrics {
        let state = self.state.read().await;
        JobMetrics {
            enqueued: state.enqueued,
            processed: state.processed,
            succeeded: state.succeeded,
            failed: state.failed,
            retried: state.retried,
            cancelled: state.cancelled,
            queue_depth: state.queue_depth,
            processing: state.processing,
            avg_duration_ms: state.durations.avg_ms(),
            min_duration_ms: state.durations.min_ms,
            max_duration_ms: state.durations.max_ms,
            last_updated: state.last_updated,
        }
    }

    pub async fn job_type_metrics(&self) -> BTreeMap<JobType, JobTypeMetrics> {
        let state = self.state.read().await;
        state
            .by_type
            .iter()
            .map(|(job_type, s)| {
                (
                    *job_type,
                    JobTypeMetrics {
                        enqueued: s.enqueued,
                        processed: s.processed,
                        succeeded: s.succeeded,
                        failed: s.failed,
                        avg_duration_ms: s.durations.avg_ms(),
                        min_duration_ms: s.durations.min_ms,
                        max_duration_ms: s.durations.max_ms,
                    },
                )
            })
            .collect()
    }

    /// Most recent records first
    pub async fn execution_history(&self, limit: usize) -> Vec<ExecutionRecord> {
        let state = self.state.read().await;
        state.history.iter().rev().take(limit).cloned().collect()
    }

    /// Most recent unsuccessful records first
    pub async fn failed_history(&self, limit: usize) -> Vec<ExecutionRecord> {
        let state = self.state.read().await;
        state
            .history
            .iter()
            .rev()
            .filter(|r| !r.is_success())
            .take(limit)
            .cloned()
            .collect()
    }

    /// Page through persisted records, newest first
    ///
    /// Records whose key already expired are skipped.
    pub async fn history_from_store(
        &self,
        offset: usize,
        limit: usize,
    ) -> JobResult<Vec<ExecutionRecord>> {
        let Some(store) = &self.store else {
            return Ok(Vec::new());
        };
        let ids = store
            .zrevrange(HISTORY_TIMELINE, offset, Some(limit))
            .await?;

        let mut records = Vec::with_capacity(ids.len());
        for (id, _) in ids {
            match store.get(&history_key(&id)).await? {
                Some(json) => match serde_json::from_str::<ExecutionRecord>(&json) {
                    Ok(record) => records.push(record),
                    Err(e) => warn!("Skipping malformed execution record {}: {}", id, e),
                },
                None => debug!("Execution record {} expired", id),
            }
        }
        Ok(records)
    }

    /// Evaluate alert thresholds against the current counters
    pub async fn failure_alerts(&self) -> Vec<FailureAlert> {
        let metrics = self.metrics().await;
        let thresholds = &self.config.alerts;
        let now = Utc::now();
        let mut alerts = Vec::new();

        let failure_rate = metrics.failure_rate();
        if metrics.processed >= thresholds.min_processed_for_failure_rate
            && failure_rate > thresholds.failure_rate
        {
            alerts.push(FailureAlert {
                kind: AlertKind::HighFailureRate,
                severity: AlertSeverity::Critical,
                message: format!(
                    "Failure rate {:.1}% over {} processed jobs exceeds {:.1}%",
                    failure_rate * 100.0,
                    metrics.processed,
                    thresholds.failure_rate * 100.0
                ),
                value: failure_rate,
                threshold: thresholds.failure_rate,
                triggered_at: now,
            });
        }

        if metrics.processing > thresholds.max_processing {
            alerts.push(FailureAlert {
                kind: AlertKind::HighProcessingCount,
                severity: AlertSeverity::Warning,
                message: format!(
                    "{} jobs processing, threshold is {}",
                    metrics.processing, thresholds.max_processing
                ),
                value: metrics.processing as f64,
                threshold: thresholds.max_processing as f64,
                triggered_at: now,
            });
        }

        if metrics.queue_depth > thresholds.max_queue_depth {
            alerts.push(FailureAlert {
                kind: AlertKind::HighQueueDepth,
                severity: AlertSeverity::Warning,
                message: format!(
                    "Queue depth {} exceeds {}",
                    metrics.queue_depth, thresholds.max_queue_depth
                ),
                value: metrics.queue_depth as f64,
                threshold: thresholds.max_queue_depth as f64,
                triggered_at: now,
            });
        }

        alerts
    }

    /// Render all counters, gauges and per-type breakdowns as text lines
    pub async fn export_text(&self) -> String {
        let metrics = self.metrics().await;
        let by_type = self.job_type_metrics().await;
        let mut out = String::new();

        let globals: [(&str, f64); 12] = [
            ("jobs_enqueued_total", metrics.enqueued as f64),
            ("jobs_processed_total", metrics.processed as f64),
            ("jobs_succeeded_total", metrics.succeeded as f64),
            ("jobs_failed_total", metrics.failed as f64),
            ("jobs_retried_total", metrics.retried as f64),
            ("jobs_cancelled_total", metrics.cancelled as f64),
            ("jobs_queue_depth", metrics.queue_depth as f64),
            ("jobs_processing", metrics.processing as f64),
            ("jobs_failure_rate", metrics.failure_rate()),
            ("jobs_duration_avg_ms", metrics.avg_duration_ms),
            (
                "jobs_duration_min_ms",
                metrics.min_duration_ms.unwrap_or(0) as f64,
            ),
            (
                "jobs_duration_max_ms",
                metrics.max_duration_ms.unwrap_or(0) as f64,
            ),
        ];
        for (name, value) in globals {
            let _ = writeln!(out, "{name} {value}");
        }

        for (job_type, m) in &by_type {
            let labelled: [(&str, f64); 5] = [
                ("job_type_enqueued_total", m.enqueued as f64),
                ("job_type_processed_total", m.processed as f64),
                ("job_type_succeeded_total", m.succeeded as f64),
                ("job_type_failed_total", m.failed as f64),
                ("job_type_duration_avg_ms", m.avg_duration_ms),
            ];
            for (name, value) in labelled {
                let _ = writeln!(out, "{name}{{type=\"{job_type}\"}} {value}");
            }
        }

        out
    }

    /// Clear counters and in-memory history; persisted records are kept
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        *state = MetricsState::default();
    }
}
