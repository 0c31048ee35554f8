use axum::{extract::State, Json};
use fleet_jobs_core::traits::JobStore;
use serde_json::{json, Value};

use crate::routes::AppState;

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let store_healthy = state.manager.queue().store().ping().await.is_ok();
    Json(json!({
        "status": if store_healthy { "ok" } else { "degraded" },
        "store": store_healthy,
        "running": state.manager.is_running().await,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "fleet-jobs",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
