use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use fleet_jobs_api::create_app;
use fleet_jobs_application::JobManager;
use fleet_jobs_core::config::AppConfig;
use fleet_jobs_core::models::{JobPayload, ReportGenerationData};
use fleet_jobs_infrastructure::InMemoryJobStore;
use fleet_jobs_testing_utils::{JobBuilder, ScheduledJobBuilder};

fn app() -> (Router, Arc<JobManager>) {
    let manager = Arc::new(JobManager::new(
        Arc::new(InMemoryJobStore::new()),
        AppConfig::default(),
    ));
    (create_app(manager.clone()), manager)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn notification_request(subject: &str) -> Value {
    json!({
        "payload": {
            "type": "notification",
            "data": {
                "channel": "email",
                "recipients": ["dispatch@fleet.example"],
                "subject": subject,
                "message": "车辆 KX-204 保养到期"
            }
        },
        "priority": 10,
        "company_id": 42
    })
}

/// 由测试构建器生成的任务拼装提交请求
fn enqueue_request(builder: JobBuilder) -> Value {
    let job = builder.build();
    json!({
        "payload": serde_json::to_value(&job.payload).unwrap(),
        "priority": job.priority.value(),
        "company_id": job.company_id,
    })
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = app();
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"], true);
    assert_eq!(body["running"], false);
}

#[tokio::test]
async fn test_enqueue_and_get_job() {
    let (app, _) = app();
    let (status, body) = send(&app, "POST", "/api/jobs", Some(notification_request("保养"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "PENDING");
    assert_eq!(body["data"]["priority"], 10);
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, "GET", &format!("/api/jobs/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["company_id"], 42);

    let (status, body) = send(&app, "GET", "/api/jobs?status=pending", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (_, body) = send(&app, "GET", "/api/jobs/stats", None).await;
    assert_eq!(body["data"]["pending"], 1);
}

#[tokio::test]
async fn test_duplicate_submission_conflicts() {
    let (app, _) = app();
    let (status, _) = send(&app, "POST", "/api/jobs", Some(notification_request("油耗"))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, "POST", "/api/jobs", Some(notification_request("油耗"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "DUPLICATE_JOB");
}

#[tokio::test]
async fn test_missing_job_and_bad_status() {
    let (app, _) = app();
    let (status, body) = send(&app, "GET", "/api/jobs/does-not-exist", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "JOB_NOT_FOUND");

    let (status, body) = send(&app, "GET", "/api/jobs?status=sleeping", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_cancel_then_retry() {
    let (app, _) = app();
    let (_, body) = send(&app, "POST", "/api/jobs", Some(notification_request("年检"))).await;
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, "POST", &format!("/api/jobs/{id}/cancel"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "CANCELLED");

    let (status, body) = send(&app, "POST", &format!("/api/jobs/{id}/cancel"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INVALID_STATE_TRANSITION");

    let (status, body) = send(&app, "POST", &format!("/api/jobs/{id}/retry"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "PENDING");
    assert_eq!(body["data"]["retry_count"], 0);
}

#[tokio::test]
async fn test_scheduled_job_lifecycle() {
    let (app, _) = app();
    let request = json!({
        "id": "nightly_fuel_report",
        "name": "每晚油耗报表",
        "payload": {
            "type": "report_generation",
            "data": {"report_type": "fuel", "format": "csv"}
        },
        "schedule": "0 0 2 * * *",
        "company_id": 7
    });
    let (status, body) = send(&app, "POST", "/api/scheduled-jobs", Some(request)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["is_active"], true);

    let (status, body) = send(
        &app,
        "POST",
        "/api/scheduled-jobs/nightly_fuel_report/deactivate",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_active"], false);

    let (_, body) = send(&app, "GET", "/api/scheduled-jobs", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = send(&app, "DELETE", "/api/scheduled-jobs/nightly_fuel_report", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&app, "DELETE", "/api/scheduled-jobs/nightly_fuel_report", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "SCHEDULED_JOB_NOT_FOUND");
}

#[tokio::test]
async fn test_invalid_schedule_is_rejected() {
    let (app, _) = app();
    let request = json!({
        "name": "broken",
        "payload": {"type": "analytics_aggregation", "data": {"period": "daily"}},
        "schedule": "every tuesday-ish"
    });
    let (status, body) = send(&app, "POST", "/api/scheduled-jobs", Some(request)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_SCHEDULE");
}

#[tokio::test]
async fn test_metrics_and_maintenance_endpoints() {
    let (app, _) = app();
    send(&app, "POST", "/api/jobs", Some(notification_request("轮胎"))).await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = String::from_utf8(
        to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec(),
    )
    .unwrap();
    assert!(text.contains("jobs_enqueued_total 1"));

    let (status, body) = send(&app, "POST", "/api/jobs/priorities/adjust", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], 0);

    let (status, body) = send(
        &app,
        "POST",
        "/api/jobs/purge",
        Some(json!({"older_than_hours": 1, "target": "all"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["completed"], 0);
    assert_eq!(body["data"]["failed"], 0);

    let (status, _) = send(&app, "GET", "/api/jobs/purge/stats?older_than_hours=48", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "GET", "/api/jobs/history?limit=5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, _) = send(&app, "POST", "/api/metrics/reset", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_oversized_schedule_interval_is_rejected() {
    let (app, manager) = app();
    let template = ScheduledJobBuilder::new("runaway", "99999999999h")
        .with_payload(JobPayload::ReportGeneration(ReportGenerationData::default()))
        .build();
    let request = json!({
        "id": template.id,
        "name": template.name,
        "payload": serde_json::to_value(&template.payload).unwrap(),
        "schedule": template.schedule,
    });
    let (status, body) = send(&app, "POST", "/api/scheduled-jobs", Some(request)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_SCHEDULE");
    assert!(manager.list_scheduled_jobs().await.is_empty());
}

#[tokio::test]
async fn test_out_of_range_retention_is_rejected() {
    let (app, _) = app();
    let (status, body) = send(
        &app,
        "POST",
        "/api/jobs/purge",
        Some(json!({"older_than_hours": 100_000_000_000u64, "target": "all"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_RETENTION");

    let (status, body) = send(
        &app,
        "GET",
        "/api/jobs/purge/stats?older_than_hours=18446744073709551615",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_RETENTION");
}

#[tokio::test]
async fn test_purge_cancelled_jobs() {
    let (app, _) = app();
    let (status, body) = send(
        &app,
        "POST",
        "/api/jobs",
        Some(enqueue_request(JobBuilder::report().with_company(9))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["payload"]["type"], "report_generation");
    assert_eq!(body["data"]["company_id"], 9);
    let id = body["data"]["id"].as_str().unwrap().to_string();
    send(&app, "POST", &format!("/api/jobs/{id}/cancel"), None).await;

    let (_, body) = send(&app, "GET", "/api/jobs/purge/stats?older_than_hours=0", None).await;
    assert_eq!(body["data"]["cancelled_total"], 1);

    let (status, body) = send(
        &app,
        "POST",
        "/api/jobs/purge",
        Some(json!({"older_than_hours": 0, "target": "cancelled"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cancelled"], 1);
    assert_eq!(body["data"]["completed"], 0);

    let (_, body) = send(&app, "GET", "/api/jobs/stats", None).await;
    assert_eq!(body["data"]["cancelled"], 0);
    let (status, _) = send(&app, "GET", &format!("/api/jobs/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
