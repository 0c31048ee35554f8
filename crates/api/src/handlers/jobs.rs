use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use fleet_jobs_core::models::{Job, JobPayload, JobPriority, JobStatus};

use crate::{
    error::{ApiError, ApiResult},
    response::{created, success},
    routes::AppState,
};

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 1000;

pub(crate) fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// 任务查询参数
#[derive(Debug, Deserialize)]
pub struct JobQueryParams {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

/// 任务提交请求
#[derive(Debug, Deserialize)]
pub struct EnqueueJobRequest {
    pub payload: JobPayload,
    pub priority: Option<i64>,
    pub max_retries: Option<u32>,
    pub company_id: Option<i64>,
    pub user_id: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl EnqueueJobRequest {
    fn into_job(self) -> Job {
        let mut job = Job::new(self.payload);
        if let Some(priority) = self.priority {
            job = job.with_priority(JobPriority::clamped(priority));
        }
        if let Some(max_retries) = self.max_retries {
            job = job.with_max_retries(max_retries);
        }
        job.company_id = self.company_id;
        job.user_id = self.user_id;
        job.tags = self.tags;
        job
    }
}

/// 按状态列出任务，默认列出等待中的任务
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobQueryParams>,
) -> ApiResult<impl IntoResponse> {
    let status = match params.status.as_deref() {
        Some(raw) => raw.parse::<JobStatus>().map_err(ApiError::BadRequest)?,
        None => JobStatus::Pending,
    };
    let jobs = state
        .manager
        .get_jobs_by_status(status, clamp_limit(params.limit))
        .await?;
    Ok(success(jobs))
}

pub async fn enqueue_job(
    State(state): State<AppState>,
    Json(request): Json<EnqueueJobRequest>,
) -> ApiResult<impl IntoResponse> {
    let job = state.manager.enqueue_job(request.into_job()).await?;
    Ok(created(job))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.manager.get_job_status(&id).await?))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.manager.cancel_job(&id).await?))
}

pub async fn retry_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.manager.retry_job(&id).await?))
}

pub async fn queue_stats(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.manager.get_queue_stats().await?))
}
