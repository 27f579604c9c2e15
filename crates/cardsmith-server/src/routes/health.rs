//! Liveness check.

use axum::{Json, Router, extract::State, routing::get};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"` when the process can answer.
    pub status: String,
    pub version: String,
    /// Uploads currently waiting for generation.
    pub active_sessions: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_sessions: state.sessions().len(),
    })
}

/// `GET /health`
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
