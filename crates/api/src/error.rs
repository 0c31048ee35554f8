use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use fleet_jobs_core::JobError;
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("任务系统错误: {0}")]
    Job(#[from] JobError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Job(err) => match err {
                JobError::JobNotFound { .. } => (StatusCode::NOT_FOUND, "JOB_NOT_FOUND"),
                JobError::ScheduledJobNotFound { .. } => {
                    (StatusCode::NOT_FOUND, "SCHEDULED_JOB_NOT_FOUND")
                }
                JobError::DuplicateJob { .. } => (StatusCode::CONFLICT, "DUPLICATE_JOB"),
                JobError::InvalidStateTransition { .. } => {
                    (StatusCode::CONFLICT, "INVALID_STATE_TRANSITION")
                }
                JobError::InvalidSchedule { .. } => (StatusCode::BAD_REQUEST, "INVALID_SCHEDULE"),
                JobError::InvalidRetention(_) => (StatusCode::BAD_REQUEST, "INVALID_RETENTION"),
                JobError::PayloadMismatch { .. } | JobError::Serialization(_) => {
                    (StatusCode::BAD_REQUEST, "INVALID_PAYLOAD")
                }
                JobError::Storage(_) => (StatusCode::SERVICE_UNAVAILABLE, "STORAGE_UNAVAILABLE"),
                JobError::AlreadyRunning(_) | JobError::NotRunning(_) => {
                    (StatusCode::CONFLICT, "LIFECYCLE_ERROR")
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            error!("API请求失败: {}", self);
        }

        let body = Json(json!({
            "success": false,
            "error": {
                "code": code,
                "message": self.to_string(),
            },
            "timestamp": chrono::Utc::now(),
        }));
        (status, body).into_response()
    }
}
