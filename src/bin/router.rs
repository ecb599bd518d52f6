//! Standalone demo of the model-routing decision endpoint.
//!
//! Serves `POST /route` with a fixed demo budget so the routing logic
//! can be exercised without the full gateway.

use axum::{body::Bytes, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use modelgate::routing::{decide, RouteRequest, TenantTokenBudget};
use tracing_subscriber::EnvFilter;

const LISTEN_ADDR: &str = "0.0.0.0:8081";

async fn handle_route(body: Bytes) -> impl IntoResponse {
    let req: RouteRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "invalid_json"})),
            )
                .into_response();
        }
    };

    let budget = TenantTokenBudget {
        monthly_token_limit: 500_000,
        used_tokens: 120_000,
    };
    Json(decide(&req, budget)).into_response()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("modelgate=info,warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let app = Router::new().route("/route", post(handle_route));
    let listener = tokio::net::TcpListener::bind(LISTEN_ADDR).await?;
    tracing::info!(addr = LISTEN_ADDR, "router demo listening");
    axum::serve(listener, app).await?;
    Ok(())
}
