//! HTTP invocation surface for the collection pipeline.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use momo_sync::{CollectPipeline, CollectorConfig, RunRequest};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::info;

pub const CRATE_NAME: &str = "momo-web";

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<CollectPipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<CollectPipeline>) -> Self {
        Self { pipeline }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/invoke", post(invoke_handler))
        .with_state(Arc::new(state))
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let port: u16 = std::env::var("MOMO_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let config = CollectorConfig::from_env();
    let pipeline = CollectPipeline::from_config(&config).await?;
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "listening");
    axum::serve(listener, app(AppState::new(Arc::new(pipeline)))).await?;
    Ok(())
}

async fn healthz_handler() -> &'static str {
    "ok"
}

/// An empty body runs with the default request.
fn parse_request(body: &[u8]) -> Result<RunRequest, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(RunRequest::default());
    }
    serde_json::from_slice(body)
}

async fn invoke_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("invalid request body: {err}") })),
            )
                .into_response();
        }
    };

    let response = state.pipeline.invoke(request).await;
    let status =
        StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response)).into_response()
}
