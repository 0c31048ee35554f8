use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};

use fleet_jobs_application::JobManager;

use crate::handlers::{health::*, jobs::*, maintenance::*, metrics::*, scheduled::*};

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<JobManager>,
}

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(export_metrics))
        // 任务
        .route("/api/jobs", get(list_jobs).post(enqueue_job))
        .route("/api/jobs/stats", get(queue_stats))
        .route("/api/jobs/metrics", get(get_metrics))
        .route("/api/jobs/metrics/types", get(get_job_type_metrics))
        .route("/api/jobs/history", get(get_history))
        .route("/api/jobs/history/failed", get(get_failed_history))
        .route("/api/jobs/alerts", get(get_alerts))
        .route("/api/jobs/priorities/adjust", post(adjust_priorities))
        .route("/api/jobs/purge", post(purge_jobs))
        .route("/api/jobs/purge/stats", get(purge_stats))
        .route("/api/jobs/{id}", get(get_job))
        .route("/api/jobs/{id}/cancel", post(cancel_job))
        .route("/api/jobs/{id}/retry", post(retry_job))
        .route("/api/metrics/reset", post(reset_metrics))
        // 定时任务
        .route(
            "/api/scheduled-jobs",
            get(list_scheduled_jobs).post(register_scheduled_job),
        )
        .route("/api/scheduled-jobs/{id}", delete(unregister_scheduled_job))
        .route(
            "/api/scheduled-jobs/{id}/activate",
            post(activate_scheduled_job),
        )
        .route(
            "/api/scheduled-jobs/{id}/deactivate",
            post(deactivate_scheduled_job),
        )
        .with_state(state)
}
