//! Route definitions for the loan API

mod documents;
mod loan;
mod risk;

use axum::{extract::DefaultBodyLimit, routing::get, Router};

use crate::handlers::{health_check, root};
use crate::middleware;
use crate::state::AppState;

pub use documents::document_routes;
pub use loan::loan_routes;
pub use risk::risk_routes;

/// Largest accepted request body; fits a maximum-size accident image once base64 encoded
pub const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Full router with tracing, security headers and the per-IP throttle.
///
/// CORS and HSTS depend on deployment and are layered on by the caller.
pub fn create_router(app_state: AppState) -> Router {
    let ip_limiter = app_state.ip_limiter.clone();

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .merge(risk_routes())
        .merge(loan_routes())
        .merge(document_routes())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(app_state)
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(axum::middleware::from_fn(move |req, next| {
            let limiter = ip_limiter.clone();
            middleware::rate_limit_layer(limiter)(req, next)
        }))
        .layer(axum::middleware::from_fn(middleware::request_tracing))
}
