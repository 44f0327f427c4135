//! Risk scoring route definitions

use axum::{routing::post, Router};

use crate::handlers::assess_risk;
use crate::state::AppState;

pub fn risk_routes() -> Router<AppState> {
    Router::new().route("/api/risk-score", post(assess_risk))
}
