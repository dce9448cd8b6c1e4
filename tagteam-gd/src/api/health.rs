//! Health and pipeline status endpoints

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::reconcile::{PipelineStatus, ReconcileState};
use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    pub uptime_seconds: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Pipeline progress response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: ReconcileState,
    pub ready: bool,
    pub expected: usize,
    pub resolved: usize,
    pub skipped: usize,
    pub shortfall: usize,
}

impl From<PipelineStatus> for StatusResponse {
    fn from(status: PipelineStatus) -> Self {
        Self {
            state: status.state,
            ready: status.state == ReconcileState::Ready,
            expected: status.expected,
            resolved: status.resolved,
            skipped: status.skipped,
            shortfall: status.shortfall,
        }
    }
}

/// GET /health
///
/// Answers as soon as the listener is up, whatever the pipeline state.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = state.status.read().await;
    let uptime = chrono::Utc::now()
        .signed_duration_since(state.startup_time)
        .num_seconds();

    Json(HealthResponse {
        status: if status.state.is_blocked() { "degraded" } else { "ok" }.to_string(),
        module: "tagteam-gd".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        last_error: status.last_error.clone(),
    })
}

/// GET /status
pub async fn pipeline_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let status = state.status.read().await.clone();
    Json(status.into())
}

/// Build health and status routes
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(pipeline_status))
}
