use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use fleet_jobs_core::models::{JobPayload, JobPriority, ScheduledJob};

use crate::{
    error::ApiResult,
    response::{created, success, ApiResponse},
    routes::AppState,
};

/// 定时任务注册请求
#[derive(Debug, Deserialize)]
pub struct RegisterScheduledJobRequest {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub payload: JobPayload,
    pub schedule: String,
    pub priority: Option<i64>,
    pub company_id: Option<i64>,
    pub user_id: Option<i64>,
}

pub async fn list_scheduled_jobs(State(state): State<AppState>) -> impl IntoResponse {
    success(state.manager.list_scheduled_jobs().await)
}

pub async fn register_scheduled_job(
    State(state): State<AppState>,
    Json(request): Json<RegisterScheduledJobRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut template = ScheduledJob::new(request.id, request.name, request.payload, request.schedule);
    if let Some(priority) = request.priority {
        template = template.with_priority(JobPriority::clamped(priority));
    }
    template.company_id = request.company_id;
    template.user_id = request.user_id;

    Ok(created(state.manager.register_scheduled_job(template).await?))
}

pub async fn unregister_scheduled_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.manager.unregister_scheduled_job(&id).await?;
    Ok(ApiResponse::success_empty_with_message(format!(
        "定时任务 {id} 已注销"
    )))
}

pub async fn activate_scheduled_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.manager.set_scheduled_job_active(&id, true).await?))
}

pub async fn deactivate_scheduled_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.manager.set_scheduled_job_active(&id, false).await?))
}
