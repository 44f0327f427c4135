//! Banner and health endpoints

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::AppState;

pub async fn root() -> &'static str {
    "Emergency Medical Loan API"
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub store: String,
    pub backend: String,
    pub version: String,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let store_status = match state.store.ping().await {
        Ok(()) => "connected".to_string(),
        Err(e) => format!("error: {}", e),
    };

    let status = if store_status == "connected" {
        "healthy"
    } else {
        "unhealthy"
    };

    Json(HealthResponse {
        status: status.to_string(),
        store: store_status,
        backend: state.backend.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
