use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use chrono::Duration;
use fleet_jobs_core::retention_from_hours;
use serde::{Deserialize, Serialize};

use crate::{
    error::ApiResult,
    response::{success, ApiResponse},
    routes::AppState,
};

const DEFAULT_RETENTION_HOURS: u64 = 24;

#[derive(Debug, Default, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PurgeTarget {
    Completed,
    Failed,
    Cancelled,
    #[default]
    All,
}

/// 清理请求
#[derive(Debug, Deserialize)]
pub struct PurgeRequest {
    pub older_than_hours: Option<u64>,
    #[serde(default)]
    pub target: PurgeTarget,
}

#[derive(Debug, Deserialize)]
pub struct PurgeStatsParams {
    pub older_than_hours: Option<u64>,
}

#[derive(Debug, Default, Serialize)]
pub struct PurgeResult {
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

/// 超出上限的保留时长映射为400
fn retention(hours: Option<u64>) -> ApiResult<Duration> {
    Ok(retention_from_hours(hours.unwrap_or(DEFAULT_RETENTION_HOURS))?)
}

pub async fn adjust_priorities(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let changed = state.manager.adjust_job_priorities().await?;
    Ok(ApiResponse::success_with_message(
        changed,
        format!("已调整 {changed} 个任务的优先级"),
    ))
}

pub async fn purge_jobs(
    State(state): State<AppState>,
    Json(request): Json<PurgeRequest>,
) -> ApiResult<impl IntoResponse> {
    let older_than = retention(request.older_than_hours)?;
    let mut result = PurgeResult::default();
    if matches!(request.target, PurgeTarget::Completed | PurgeTarget::All) {
        result.completed = state.manager.purge_completed_jobs(older_than).await?;
    }
    if matches!(request.target, PurgeTarget::Failed | PurgeTarget::All) {
        result.failed = state.manager.purge_failed_jobs(older_than).await?;
    }
    if matches!(request.target, PurgeTarget::Cancelled | PurgeTarget::All) {
        result.cancelled = state.manager.purge_cancelled_jobs(older_than).await?;
    }
    Ok(success(result))
}

pub async fn purge_stats(
    State(state): State<AppState>,
    Query(params): Query<PurgeStatsParams>,
) -> ApiResult<impl IntoResponse> {
    let older_than = retention(params.older_than_hours)?;
    Ok(success(state.manager.get_purge_stats(older_than).await?))
}
