//! Request logging middleware.

use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::state::AppState;

/// Log method, path, status and latency for each request.
///
/// For SSE responses the latency covers time to the response head, not the
/// life of the stream.
pub async fn request_logging_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.config.request_logging {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let duration_ms = start.elapsed().as_millis() as u64;

    match status {
        500.. => tracing::error!(%method, %path, status, duration_ms, "Request failed"),
        400..500 => tracing::warn!(%method, %path, status, duration_ms, "Request rejected"),
        _ => tracing::info!(%method, %path, status, duration_ms, "Request completed"),
    }

    response
}
