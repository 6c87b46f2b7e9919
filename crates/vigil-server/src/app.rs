use crate::state::AppState;
use crate::{api, auth, logging};
use axum::http::HeaderValue;
use axum::routing::get;
use axum::{middleware, Json, Router};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "vigil API",
        description = "Agent run-control and utilization sample ingestion",
    ),
    tags(
        (name = "Control", description = "Per-agent desired run-state"),
        (name = "Ingestion", description = "Sample delivery from agents"),
        (name = "Metrics", description = "Stored samples"),
        (name = "Agents", description = "Agents seen by the ingestion path"),
        (name = "Health", description = "Service health")
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_key",
            utoipa::openapi::security::SecurityScheme::ApiKey(
                utoipa::openapi::security::ApiKey::Header(
                    utoipa::openapi::security::ApiKeyValue::new(auth::API_KEY_HEADER),
                ),
            ),
        );
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

pub fn build_http_app(state: AppState) -> Router {
    let (control_router, control_spec) = api::control_routes().split_for_parts();
    let (ingest_router, ingest_spec) = api::ingest_routes().split_for_parts();
    let (query_router, query_spec) = api::query_routes().split_for_parts();

    let mut spec = ApiDoc::openapi();
    spec.merge(control_spec);
    spec.merge(ingest_spec);
    spec.merge(query_spec);
    let spec = Arc::new(spec);

    let cors = cors_layer(&state.config.cors_allowed_origins);

    control_router
        .merge(ingest_router)
        .merge(query_router)
        .with_state(state)
        .route(
            "/openapi.json",
            get(move || {
                let spec = spec.clone();
                async move { Json(spec.as_ref().clone()) }
            }),
        )
        .layer(cors)
        .layer(middleware::from_fn(logging::request_logging))
}
