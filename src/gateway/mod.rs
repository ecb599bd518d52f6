//! Axum-based HTTP surface for the admission pipeline.
//!
//! Thin layer: every endpoint authenticates (where required), decodes,
//! and delegates to the pipeline. Body size is capped at 1 MiB and every
//! response except the Prometheus exposition is `application/json`.

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Deserialize;
use std::sync::Arc;

use crate::admission::AdmissionPipeline;
use crate::config::Config;
use crate::contracts::{CompletionRequest, ErrorResponse};
use crate::error::AppError;
use crate::metrics::MetricsSink;
use crate::providers::{ModelClient, SimulatedModelClient};

/// Maximum request body size (1 MiB).
pub const MAX_BODY_SIZE: usize = 1 << 20;

/// Shared state for all axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AdmissionPipeline>,
    pub metrics: Arc<MetricsSink>,
}

/// Generate an opaque request id from the OS entropy source.
fn request_id() -> String {
    let mut buf = [0u8; 8];
    match OsRng.try_fill_bytes(&mut buf) {
        Ok(()) => format!("req-{}", hex::encode(buf)),
        Err(_) => "req-fallback".to_owned(),
    }
}

/// Build the gateway router around an existing pipeline.
pub fn build_router(pipeline: Arc<AdmissionPipeline>, metrics: Arc<MetricsSink>) -> Router {
    let state = AppState { pipeline, metrics };

    Router::new()
        .route(
            "/healthz",
            get(handle_health).fallback(handle_method_not_allowed),
        )
        .route(
            "/metrics",
            get(handle_metrics).fallback(handle_method_not_allowed),
        )
        .route(
            "/v1/gateway/completions",
            post(handle_completion).fallback(handle_method_not_allowed),
        )
        .route(
            "/v1/teams/me/usage",
            get(handle_usage).fallback(handle_method_not_allowed),
        )
        .route(
            "/v1/audit",
            get(handle_audit).fallback(handle_method_not_allowed),
        )
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
}

/// Run the HTTP gateway until shutdown is signalled.
pub async fn run_gateway(cfg: Config) -> anyhow::Result<()> {
    let metrics = Arc::new(MetricsSink::new()?);
    let model_client: Arc<dyn ModelClient> = Arc::new(SimulatedModelClient);
    let pipeline = Arc::new(AdmissionPipeline::new(
        &cfg,
        Arc::clone(&metrics),
        model_client,
    ));

    let app = build_router(pipeline, metrics);
    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
    tracing::info!(addr = %cfg.listen_addr, "gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to install shutdown signal handler");
    }
}

/// GET /healthz — liveness probe, always public.
async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// GET /metrics — Prometheus text exposition, always public.
async fn handle_metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => {
            tracing::error!(%err, "failed to render metrics");
            AppError::internal(&err).into_envelope("")
        }
    }
}

/// POST /v1/gateway/completions — the admission path.
///
/// The body is decoded by hand: no particular content-type is required,
/// and both the 1 MiB cap and malformed JSON map to the same envelope.
async fn handle_completion(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let request_id = request_id();

    let principal = match state.pipeline.authenticate(&headers) {
        Ok(principal) => principal,
        Err(err) => return err.into_envelope(&request_id),
    };

    let bytes = match body {
        Ok(bytes) => bytes,
        Err(rejection) => {
            tracing::warn!(request_id = %request_id, %rejection, "rejected completion body");
            return AppError::new("invalid_json", "invalid JSON body", StatusCode::BAD_REQUEST)
                .into_envelope(&request_id);
        }
    };
    let req: CompletionRequest = match serde_json::from_slice(&bytes) {
        Ok(req) => req,
        Err(err) => {
            tracing::warn!(request_id = %request_id, %err, "rejected completion body");
            return AppError::new("invalid_json", "invalid JSON body", StatusCode::BAD_REQUEST)
                .into_envelope(&request_id);
        }
    };

    match state
        .pipeline
        .handle_completion(&request_id, &principal, &req)
        .await
    {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err(err) => err.into_envelope(&request_id),
    }
}

/// GET /v1/teams/me/usage — usage and budget snapshot for the caller.
async fn handle_usage(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let request_id = request_id();
    match state.pipeline.authenticate(&headers) {
        Ok(principal) => Json(state.pipeline.usage(&principal)).into_response(),
        Err(err) => err.into_envelope(&request_id),
    }
}

#[derive(Debug, Deserialize)]
struct AuditParams {
    #[serde(default)]
    limit: Option<String>,
}

/// GET /v1/audit?limit=N — the caller's recent audit records.
async fn handle_audit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<AuditParams>,
) -> Response {
    let request_id = request_id();
    let principal = match state.pipeline.authenticate(&headers) {
        Ok(principal) => principal,
        Err(err) => return err.into_envelope(&request_id),
    };

    // Unparseable limits fall back to the store default.
    let limit = params
        .limit
        .as_deref()
        .map(str::trim)
        .and_then(|raw| raw.parse::<i64>().ok())
        .unwrap_or(0);

    let events = state.pipeline.audit_events(&principal, limit);
    Json(serde_json::json!({"events": events})).into_response()
}

/// Shared 405 for any routed path hit with the wrong method.
async fn handle_method_not_allowed() -> Response {
    let body = ErrorResponse {
        error: "method not allowed".into(),
        code: "method_not_allowed".into(),
        request_id: String::new(),
    };
    (StatusCode::METHOD_NOT_ALLOWED, Json(body)).into_response()
}
