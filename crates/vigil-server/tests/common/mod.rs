#![allow(dead_code)]

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;
use vigil_common::types::{AgentRecord, CommandRecord, DesiredState, MetricPoint, Sample};
use vigil_server::app;
use vigil_server::config::ServerConfig;
use vigil_server::state::AppState;
use vigil_storage::engine::SqliteStorageEngine;
use vigil_storage::{PartitionInfo, StorageEngine, StorageError};

pub const API_KEY: &str = "test-key";

pub struct TestContext {
    pub temp_dir: TempDir,
    pub state: AppState,
    pub app: axum::Router,
}

pub fn build_test_context() -> Result<TestContext> {
    build_test_context_with(Some(API_KEY))
}

pub fn build_test_context_with(api_key: Option<&str>) -> Result<TestContext> {
    let temp_dir = tempfile::tempdir()?;
    let storage = Arc::new(SqliteStorageEngine::new(temp_dir.path())?);
    let config = ServerConfig {
        data_dir: temp_dir.path().to_string_lossy().to_string(),
        api_key: api_key.map(str::to_string),
        ..ServerConfig::default()
    };
    let state = AppState::new(storage, config);
    let app = app::build_http_app(state.clone());
    Ok(TestContext {
        temp_dir,
        state,
        app,
    })
}

/// Storage whose every call fails, for exercising the 500 paths.
pub struct BrokenStorage;

fn broken<T>() -> vigil_storage::Result<T> {
    Err(StorageError::Other("disk unavailable".to_string()))
}

impl StorageEngine for BrokenStorage {
    fn insert_metric(&self, _sample: &Sample) -> vigil_storage::Result<()> {
        broken()
    }
    fn query_metrics(&self, _agent_id: &str, _limit: usize) -> vigil_storage::Result<Vec<MetricPoint>> {
        broken()
    }
    fn get_command(&self, _agent_id: &str) -> vigil_storage::Result<Option<CommandRecord>> {
        broken()
    }
    fn set_command(&self, _agent_id: &str, _state: DesiredState) -> vigil_storage::Result<CommandRecord> {
        broken()
    }
    fn touch_agent(&self, _agent_id: &str, _seen_at: DateTime<Utc>) -> vigil_storage::Result<()> {
        broken()
    }
    fn list_agents(&self) -> vigil_storage::Result<Vec<AgentRecord>> {
        broken()
    }
    fn cleanup(&self, _retention_days: u32) -> vigil_storage::Result<u32> {
        broken()
    }
    fn list_partitions(&self) -> vigil_storage::Result<Vec<PartitionInfo>> {
        broken()
    }
}

pub fn build_broken_app() -> axum::Router {
    let config = ServerConfig {
        api_key: Some(API_KEY.to_string()),
        ..ServerConfig::default()
    };
    app::build_http_app(AppState::new(Arc::new(BrokenStorage), config))
}

async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value, Option<String>) {
    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");

    let status = resp.status();
    let trace_id = resp
        .headers()
        .get("x-trace-id")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice::<Value>(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };

    (status, json, trace_id)
}

pub async fn request_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    api_key: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value, Option<String>) {
    request_raw(app, method, uri, api_key, body.unwrap_or(Value::Null).to_string()).await
}

pub async fn request_raw(
    app: &axum::Router,
    method: &str,
    uri: &str,
    api_key: Option<&str>,
    body: String,
) -> (StatusCode, Value, Option<String>) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = api_key {
        builder = builder.header("X-API-Key", key);
    }
    builder = builder.header("Content-Type", "application/json");
    let req = builder
        .body(Body::from(body))
        .expect("request should build");
    send(app, req).await
}

pub async fn request_no_body(
    app: &axum::Router,
    method: &str,
    uri: &str,
) -> (StatusCode, Value, Option<String>) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    send(app, req).await
}

pub fn assert_err_envelope(body: &Value, expected_code: i64) {
    assert_eq!(body["err_code"], expected_code, "unexpected body: {body}");
    assert!(body["err_msg"].is_string());
    assert!(body["trace_id"].as_str().is_some_and(|t| t.len() == 16));
}

pub fn sample_json(agent_id: &str, timestamp: &str, cpu: f64, ram: f64) -> Value {
    serde_json::json!({
        "agent_id": agent_id,
        "timestamp": timestamp,
        "cpu": cpu,
        "ram": ram,
    })
}
