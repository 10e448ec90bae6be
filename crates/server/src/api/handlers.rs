//! Health, config, and metrics handlers.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;

use crate::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": VERSION,
    }))
}

/// Get sanitized configuration
pub async fn get_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.sanitized_config())
}

/// Prometheus metrics in text exposition format
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let families = state.metrics_registry().gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new());
    }

    (
        StatusCode::OK,
        String::from_utf8(buffer).unwrap_or_default(),
    )
}
