//! # Fleet Jobs API
//!
//! 后台任务系统的管理接口，基于Axum构建。
//!
//! ## API 端点
//!
//! ### 任务
//! - `GET /api/jobs?status=pending&limit=50` - 按状态列出任务
//! - `POST /api/jobs` - 提交任务
//! - `GET /api/jobs/{id}` - 查询任务状态
//! - `POST /api/jobs/{id}/cancel` - 取消排队中的任务
//! - `POST /api/jobs/{id}/retry` - 重新排队失败或取消的任务
//! - `GET /api/jobs/stats` - 队列深度
//!
//! ### 指标与历史
//! - `GET /metrics` - 文本格式指标
//! - `GET /api/jobs/metrics` / `GET /api/jobs/metrics/types`
//! - `GET /api/jobs/history` / `GET /api/jobs/history/failed`
//! - `GET /api/jobs/alerts` - 失败率告警
//! - `POST /api/metrics/reset`
//!
//! ### 维护
//! - `POST /api/jobs/priorities/adjust` - 立即执行一轮优先级调整
//! - `POST /api/jobs/purge` - 清理过期终态任务
//! - `GET /api/jobs/purge/stats` - 清理预估
//!
//! ### 定时任务
//! - `GET /api/scheduled-jobs` / `POST /api/scheduled-jobs`
//! - `DELETE /api/scheduled-jobs/{id}`
//! - `POST /api/scheduled-jobs/{id}/activate` / `deactivate`
//!
//! ## 提交任务示例
//!
//! ```bash
//! curl -X POST http://localhost:8080/api/jobs \
//!   -H "Content-Type: application/json" \
//!   -d '{
//!     "payload": {"type": "notification", "data": {"channel": "email", "recipients": ["ops@fleet.io"], "subject": "保养提醒", "message": "..."}},
//!     "priority": 10,
//!     "company_id": 42
//!   }'
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use fleet_jobs_application::JobManager;
use tower::ServiceBuilder;

use crate::middleware::{cors_layer, request_logging, trace_layer};
use crate::routes::{create_routes, AppState};

pub fn create_app(manager: Arc<JobManager>) -> Router {
    create_routes(AppState { manager }).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(cors_layer())
            .layer(axum::middleware::from_fn(request_logging)),
    )
}
