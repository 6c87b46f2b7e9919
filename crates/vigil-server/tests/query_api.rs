mod common;

use axum::http::StatusCode;
use common::{
    assert_err_envelope, build_broken_app, build_test_context, request_json, request_no_body,
    sample_json, API_KEY,
};

async fn ingest_series(app: &axum::Router, agent_id: &str, count: u32) {
    for i in 0..count {
        let ts = format!("2024-05-01T10:{:02}:{:02}Z", i / 60, i % 60);
        let (status, _, _) = request_json(
            app,
            "POST",
            "/collect",
            Some(API_KEY),
            Some(sample_json(agent_id, &ts, f64::from(i % 100), 50.0)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
}

fn cpus(body: &serde_json::Value) -> Vec<f64> {
    body.as_array()
        .expect("metrics body should be an array")
        .iter()
        .map(|p| p["cpu"].as_f64().unwrap())
        .collect()
}

#[tokio::test]
async fn metrics_return_latest_n_oldest_first() {
    let ctx = build_test_context().expect("test context should build");
    ingest_series(&ctx.app, "pc-001", 5).await;

    let (status, body, _) = request_no_body(&ctx.app, "GET", "/metrics/pc-001?limit=3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cpus(&body), vec![2.0, 3.0, 4.0]);
    assert!(body[0]["timestamp"].is_string());
    assert!(body[0]["ram"].is_number());

    let (_, body, _) = request_no_body(&ctx.app, "GET", "/metrics/pc-001").await;
    assert_eq!(cpus(&body), vec![0.0, 1.0, 2.0, 3.0, 4.0]);
}

#[tokio::test]
async fn metrics_default_limit_is_100() {
    let ctx = build_test_context().expect("test context should build");
    ingest_series(&ctx.app, "pc-001", 105).await;

    let (_, body, _) = request_no_body(&ctx.app, "GET", "/metrics/pc-001").await;
    let cpus = cpus(&body);
    assert_eq!(cpus.len(), 100);
    // Samples 5..=104, so the first is cpu 5 and the last wraps to 4
    assert_eq!(cpus[0], 5.0);
    assert_eq!(cpus[99], 4.0);
}

#[tokio::test]
async fn metrics_for_unknown_agent_are_empty() {
    let ctx = build_test_context().expect("test context should build");
    let (status, body, _) = request_no_body(&ctx.app, "GET", "/metrics/nobody").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!([]));
}

#[tokio::test]
async fn agents_list_reflects_ingestion() {
    let ctx = build_test_context().expect("test context should build");
    let (_, body, _) = request_no_body(&ctx.app, "GET", "/agents").await;
    assert_eq!(body, serde_json::json!([]));

    ingest_series(&ctx.app, "pc-001", 1).await;
    let (status, body, _) = request_no_body(&ctx.app, "GET", "/agents").await;
    assert_eq!(status, StatusCode::OK);
    let agents = body.as_array().unwrap();
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0]["agent_id"], "pc-001");
    // last_seen is the receive time, so the agent is active right away
    assert_eq!(agents[0]["active"], true);
}

#[tokio::test]
async fn health_reports_ok() {
    let ctx = build_test_context().expect("test context should build");
    let (status, body, trace) = request_no_body(&ctx.app, "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
    assert!(body["time"].is_string());
    assert!(body["uptime_secs"].as_i64().unwrap() >= 0);
    assert!(trace.is_some());
}

#[tokio::test]
async fn health_degrades_when_storage_fails() {
    let app = build_broken_app();
    let (status, body, _) = request_no_body(&app, "GET", "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");

    let (status, body, _) = request_no_body(&app, "GET", "/agents").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_err_envelope(&body, 1501);
}

#[tokio::test]
async fn openapi_document_lists_routes() {
    let ctx = build_test_context().expect("test context should build");
    let (status, body, _) = request_no_body(&ctx.app, "GET", "/openapi.json").await;
    assert_eq!(status, StatusCode::OK);
    let paths = body["paths"].as_object().expect("paths should exist");
    for path in [
        "/command/{agent_id}",
        "/collect",
        "/ingest",
        "/metrics/{agent_id}",
        "/agents",
        "/health",
    ] {
        assert!(paths.contains_key(path), "missing {path}");
    }
    assert!(paths["/command/{agent_id}"]["get"].is_object());
    assert!(paths["/command/{agent_id}"]["post"].is_object());
}
