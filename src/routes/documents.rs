//! Document route definitions

use axum::{routing::post, Router};

use crate::handlers::register_document_hash;
use crate::state::AppState;

pub fn document_routes() -> Router<AppState> {
    Router::new().route("/api/documents/hashes", post(register_document_hash))
}
