//! HTTP handlers for the control and ingestion services.
//!
//! Successful responses carry the bare payload documented on each route.
//! Failures use the [`ApiError`] envelope whose `trace_id` matches the
//! `X-Trace-Id` response header.

use crate::auth::{presented_credential, AuthError};
use crate::control::{self, ControlError};
use crate::ingest::{self, IngestError};
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::{router::OpenApiRouter, routes};
use vigil_common::types::{
    CommandResponse, MetricPoint, Sample, SetCommandRequest, SetCommandResponse, StatusResponse,
};
use vigil_common::validation::validate_agent_id;

const DEFAULT_METRICS_LIMIT: usize = 100;
const MAX_METRICS_LIMIT: usize = 1000;

/// Error envelope returned by every failing request.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    pub err_code: i32,
    pub err_msg: String,
    pub trace_id: String,
}

fn to_custom_error_code(code: &str) -> i32 {
    match code {
        "bad_request" => 1001,
        "unauthorized" => 1002,
        "not_found" => 1004,
        "payload_too_large" => 1006,
        "internal_error" => 1500,
        "storage_error" => 1501,
        _ => 1999,
    }
}

pub fn error_response(status: StatusCode, trace_id: &str, code: &str, msg: &str) -> Response {
    (
        status,
        Json(ApiError {
            err_code: to_custom_error_code(code),
            err_msg: msg.to_string(),
            trace_id: trace_id.to_string(),
        }),
    )
        .into_response()
}

fn auth_error_response(trace_id: &str, e: &AuthError) -> Response {
    error_response(StatusCode::UNAUTHORIZED, trace_id, "unauthorized", &e.to_string())
}

fn storage_error_response(trace_id: &str, e: &dyn std::fmt::Display) -> Response {
    tracing::error!(trace_id = %trace_id, error = %e, "Storage operation failed");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        trace_id,
        "storage_error",
        "storage unavailable, retry later",
    )
}

fn control_error_response(trace_id: &str, e: &ControlError) -> Response {
    match e {
        ControlError::Auth(e) => auth_error_response(trace_id, e),
        ControlError::Validation(e) => {
            error_response(StatusCode::BAD_REQUEST, trace_id, "bad_request", &e.to_string())
        }
        ControlError::Storage(e) => storage_error_response(trace_id, e),
    }
}

fn ingest_error_response(trace_id: &str, e: &IngestError) -> Response {
    match e {
        IngestError::Auth(e) => auth_error_response(trace_id, e),
        IngestError::Validation(e) => {
            error_response(StatusCode::BAD_REQUEST, trace_id, "bad_request", &e.to_string())
        }
        IngestError::Storage(e) => storage_error_response(trace_id, e),
    }
}

fn json_rejection_response(trace_id: &str, rejection: &JsonRejection) -> Response {
    match rejection {
        JsonRejection::BytesRejection(_) => error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            trace_id,
            "payload_too_large",
            &rejection.body_text(),
        ),
        _ => error_response(
            StatusCode::BAD_REQUEST,
            trace_id,
            "bad_request",
            &rejection.body_text(),
        ),
    }
}

// ---- control ----

/// Current desired run-state of an agent. Identities without a stored
/// command read as `stop` with a null `updated_at`.
#[utoipa::path(
    get,
    path = "/command/{agent_id}",
    tag = "Control",
    params(("agent_id" = String, Path, description = "Agent identity")),
    responses(
        (status = 200, description = "Desired run-state", body = CommandResponse),
        (status = 400, description = "Invalid agent identity", body = ApiError),
        (status = 500, description = "Storage failure", body = ApiError)
    )
)]
async fn get_command(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Response {
    match control::read_command(&state, &agent_id).await {
        Ok(record) => Json(CommandResponse::from(record)).into_response(),
        Err(e) => control_error_response(&trace_id, &e),
    }
}

/// Sets the desired run-state of an agent.
#[utoipa::path(
    post,
    path = "/command/{agent_id}",
    tag = "Control",
    security(("api_key" = [])),
    params(("agent_id" = String, Path, description = "Agent identity")),
    request_body = SetCommandRequest,
    responses(
        (status = 200, description = "Command stored", body = SetCommandResponse),
        (status = 400, description = "Unknown command or invalid identity", body = ApiError),
        (status = 401, description = "Missing or invalid credential", body = ApiError),
        (status = 500, description = "Storage failure", body = ApiError)
    )
)]
async fn set_command(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<SetCommandRequest>, JsonRejection>,
) -> Response {
    let credential = presented_credential(&headers);
    // Credential first, body second
    if let Err(e) = crate::auth::check_credential(state.config.api_key.as_deref(), credential) {
        return auth_error_response(&trace_id, &e);
    }
    let Json(req) = match payload {
        Ok(p) => p,
        Err(rejection) => return json_rejection_response(&trace_id, &rejection),
    };

    match control::write_command(&state, &agent_id, &req.command, credential).await {
        Ok(record) => Json(SetCommandResponse {
            status: "ok".to_string(),
            agent_id: record.agent_id,
            command: record.desired_state,
        })
        .into_response(),
        Err(e) => control_error_response(&trace_id, &e),
    }
}

// ---- ingestion ----

/// Stores one sample delivered by an agent. `client_id` is accepted in place
/// of `agent_id`, and timestamps without an offset are read as UTC.
#[utoipa::path(
    post,
    path = "/collect",
    tag = "Ingestion",
    security(("api_key" = [])),
    request_body = Sample,
    responses(
        (status = 200, description = "Sample stored", body = StatusResponse),
        (status = 400, description = "Malformed payload or value out of range", body = ApiError),
        (status = 401, description = "Missing or invalid credential", body = ApiError),
        (status = 500, description = "Storage failure, safe to retry", body = ApiError)
    )
)]
async fn collect(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Sample>, JsonRejection>,
) -> Response {
    let credential = presented_credential(&headers);
    if let Err(e) = crate::auth::check_credential(state.config.api_key.as_deref(), credential) {
        return auth_error_response(&trace_id, &e);
    }
    let Json(sample) = match payload {
        Ok(p) => p,
        Err(rejection) => return json_rejection_response(&trace_id, &rejection),
    };

    match ingest::ingest(&state, sample, credential).await {
        Ok(()) => Json(StatusResponse::ok()).into_response(),
        Err(e) => ingest_error_response(&trace_id, &e),
    }
}

/// Alias of `POST /collect`.
#[utoipa::path(
    post,
    path = "/ingest",
    tag = "Ingestion",
    security(("api_key" = [])),
    request_body = Sample,
    responses(
        (status = 200, description = "Sample stored", body = StatusResponse),
        (status = 400, description = "Malformed payload or value out of range", body = ApiError),
        (status = 401, description = "Missing or invalid credential", body = ApiError),
        (status = 500, description = "Storage failure, safe to retry", body = ApiError)
    )
)]
async fn ingest_alias(
    trace_id: Extension<TraceId>,
    state: State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Sample>, JsonRejection>,
) -> Response {
    collect(trace_id, state, headers, payload).await
}

// ---- queries ----

#[derive(Debug, Deserialize, IntoParams)]
pub struct MetricsQuery {
    /// Number of most recent samples to return (default 100, at most 1000).
    pub limit: Option<usize>,
}

/// The most recent samples of an agent, oldest first.
#[utoipa::path(
    get,
    path = "/metrics/{agent_id}",
    tag = "Metrics",
    params(
        ("agent_id" = String, Path, description = "Agent identity"),
        MetricsQuery
    ),
    responses(
        (status = 200, description = "Samples in chronological order", body = Vec<MetricPoint>),
        (status = 400, description = "Invalid agent identity", body = ApiError),
        (status = 500, description = "Storage failure", body = ApiError)
    )
)]
async fn get_metrics(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Query(query): Query<MetricsQuery>,
) -> Response {
    if let Err(e) = validate_agent_id(&agent_id) {
        return error_response(StatusCode::BAD_REQUEST, &trace_id, "bad_request", &e.to_string());
    }
    let limit = query
        .limit
        .unwrap_or(DEFAULT_METRICS_LIMIT)
        .min(MAX_METRICS_LIMIT);
    match state
        .with_storage(move |s| s.query_metrics(&agent_id, limit))
        .await
    {
        Ok(points) => Json(points).into_response(),
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AgentResponse {
    pub agent_id: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Delivered data within the configured activity window.
    pub active: bool,
}

/// Agents that delivered at least one sample, most recently seen first.
#[utoipa::path(
    get,
    path = "/agents",
    tag = "Agents",
    responses(
        (status = 200, description = "Known agents", body = Vec<AgentResponse>),
        (status = 500, description = "Storage failure", body = ApiError)
    )
)]
async fn list_agents(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> Response {
    let agents = match state.with_storage(|s| s.list_agents()).await {
        Ok(agents) => agents,
        Err(e) => return storage_error_response(&trace_id, &e),
    };
    let window_secs = i64::try_from(state.config.agent_active_secs).unwrap_or(i64::MAX);
    let now = Utc::now();
    let items: Vec<AgentResponse> = agents
        .into_iter()
        .map(|a| AgentResponse {
            active: (now - a.last_seen).num_seconds() < window_secs,
            agent_id: a.agent_id,
            first_seen: a.first_seen,
            last_seen: a.last_seen,
        })
        .collect();
    Json(items).into_response()
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when storage cannot be read.
    pub status: String,
    pub time: DateTime<Utc>,
    pub version: String,
    pub uptime_secs: i64,
    pub partitions: usize,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Storage is unreadable", body = HealthResponse)
    )
)]
async fn health(State(state): State<AppState>) -> Response {
    let now = Utc::now();
    let partitions = state.with_storage(|s| s.list_partitions()).await;
    let (status, code, partitions) = match partitions {
        Ok(p) => ("ok", StatusCode::OK, p.len()),
        Err(e) => {
            tracing::error!(error = %e, "Health check could not read storage");
            ("degraded", StatusCode::SERVICE_UNAVAILABLE, 0)
        }
    };
    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            time: now,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: (now - state.start_time).num_seconds(),
            partitions,
        }),
    )
        .into_response()
}

pub fn control_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(get_command, set_command))
}

pub fn ingest_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(collect))
        .routes(routes!(ingest_alias))
}

pub fn query_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(get_metrics))
        .routes(routes!(list_agents))
        .routes(routes!(health))
}
