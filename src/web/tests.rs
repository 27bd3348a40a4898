use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::routes::create_router;
use super::state::AppState;
use crate::config::{AppConfig, DEFAULT_COLLECTION};
use crate::db::{MemoryStore, PlanStore};
use crate::model::tests::record;
use crate::model::ExecutionStatus;

fn app() -> Router {
    let store = MemoryStore::new();
    let mut records = vec![
        record("fast", ExecutionStatus::Success, 10.0),
        record("medium", ExecutionStatus::Success, 50.0),
        record("slow", ExecutionStatus::Success, 200.0),
        record("broken", ExecutionStatus::Error, 0.0),
    ];
    for (i, r) in records.iter_mut().enumerate() {
        r.timestamp = 1_700_000_000.0 + i as f64;
    }
    store.insert_records(DEFAULT_COLLECTION, &records).unwrap();

    let state = AppState::new(AppConfig::default(), Arc::new(store)).unwrap();
    create_router(Arc::new(state))
}

async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn get(uri: &str) -> (StatusCode, Value) {
    send(app(), Method::GET, uri, None).await
}

// ==========================================================================
// Browsing
// ==========================================================================

#[tokio::test]
async fn test_health_and_status() {
    let (status, body) = get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = get("/api/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["collection_count"], 1);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_collections_and_paging() {
    let (_, body) = get("/api/collections").await;
    assert_eq!(body["collections"], json!(["sql_executions"]));

    let (status, body) = get("/api/plans?page=2&size=3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 4);
    assert_eq!(body["pages"], 2);
    assert_eq!(body["items"][0]["_id"], "fast");

    let (status, body) = get("/api/plans?size=10000").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], true);

    let (status, body) = get("/api/plans?collection=missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_plan_detail() {
    let (status, body) = get("/api/plans/slow/detail").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["plan_id"], "slow");
    assert_eq!(body["root_node"], "node_0");
    assert_eq!(body["nodes"][0]["node_type"], "Seq Scan");

    let (status, body) = get("/api/plans/ghost/detail").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

// ==========================================================================
// Statistics
// ==========================================================================

#[tokio::test]
async fn test_basic_stats_omit_slow_fields() {
    let (status, body) = get("/api/stats/basic").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_plans"], 4);
    assert_eq!(body["success_count"], 3);
    assert_eq!(body["error_count"], 1);
    assert!(body.get("slow_sql_count").is_none());
    assert_eq!(body["execution_time_distribution"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_summary_uses_configured_threshold() {
    let (status, body) = get("/api/stats/summary").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["slow_sql_count"], 1);
    assert_eq!(body["slow_sql_threshold"], 100.0);
    assert_eq!(body["min_execution_time"], 10.0);
    assert_eq!(body["max_execution_time"], 200.0);
    let avg = body["avg_execution_time"].as_f64().unwrap();
    assert!((avg - 86.67).abs() < 0.01);
}

#[tokio::test]
async fn test_slow_sql_requires_threshold() {
    let (status, body) = get("/api/stats/slow-sql").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");

    let (status, body) = get("/api/stats/slow-sql?slow_sql_threshold=40").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["slow_sql_count"], 2);
}

#[tokio::test]
async fn test_slow_sql_list_and_plan_shape() {
    let (status, body) = get("/api/stats/slow-sql-list?slow_sql_threshold=40&limit=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["items"][0]["_id"], "slow");

    let (status, body) = get("/api/stats/plan-shape").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["analyzed_plans"], 3);
    assert_eq!(body["max_plan_nodes"], 1);
}

// ==========================================================================
// Search and comparison
// ==========================================================================

#[tokio::test]
async fn test_search_filters() {
    let (status, body) = get("/api/search?status=success&min_execution_time=40&max_execution_time=").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);

    let (status, body) = get("/api/search?q=T_SLOW").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"][0]["_id"], "slow");

    let (status, body) = get("/api/search?min_execution_time=200&max_execution_time=100").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "INVALID_FILTER");

    let (status, _) = get("/api/search?page=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_compare_endpoint() {
    let (status, body) = send(
        app(),
        Method::POST,
        "/api/analysis/compare",
        Some(json!({"plan_ids": ["fast", "slow"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["comparison_metrics"]["total_plans"], 2);
    assert_eq!(body["comparison_metrics"]["fastest_plan_id"], "fast");
    assert_eq!(body["node_table"].as_array().unwrap().len(), 2);

    let (status, body) = send(
        app(),
        Method::POST,
        "/api/analysis/compare",
        Some(json!({"plan_ids": ["fast"]})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "INSUFFICIENT_PLANS");

    let (status, _) = send(
        app(),
        Method::POST,
        "/api/analysis/compare",
        Some(json!({"plan_ids": ["fast", "broken"]})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
