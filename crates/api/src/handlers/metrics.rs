use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::{
    error::ApiResult,
    handlers::jobs::clamp_limit,
    response::{success, ApiResponse},
    routes::AppState,
};

/// 执行历史查询参数
#[derive(Debug, Deserialize)]
pub struct HistoryQueryParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    /// `store` 表示从持久化历史分页读取
    pub source: Option<String>,
}

/// 文本格式的指标导出
pub async fn export_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.manager.export_metrics().await,
    )
}

pub async fn get_metrics(State(state): State<AppState>) -> impl IntoResponse {
    success(state.manager.get_metrics().await)
}

pub async fn get_job_type_metrics(State(state): State<AppState>) -> impl IntoResponse {
    success(state.manager.get_job_type_metrics().await)
}

pub async fn get_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryQueryParams>,
) -> ApiResult<impl IntoResponse> {
    let limit = clamp_limit(params.limit);
    let records = match params.source.as_deref() {
        Some("store") => {
            state
                .manager
                .get_execution_history_from_store(params.offset.unwrap_or(0), limit)
                .await?
        }
        _ => state.manager.get_execution_history(limit).await,
    };
    Ok(success(records))
}

pub async fn get_failed_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryQueryParams>,
) -> impl IntoResponse {
    success(
        state
            .manager
            .get_failed_jobs_history(clamp_limit(params.limit))
            .await,
    )
}

pub async fn get_alerts(State(state): State<AppState>) -> impl IntoResponse {
    success(state.manager.get_failure_alerts().await)
}

pub async fn reset_metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.manager.reset_metrics().await;
    ApiResponse::success_empty_with_message("指标已重置".to_string())
}
