//! Loan route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::{confirm_loan, final_approval, get_audit_trail, get_loan};
use crate::state::AppState;

pub fn loan_routes() -> Router<AppState> {
    Router::new()
        .route("/api/loans/final-approval", post(final_approval))
        .route("/api/loans/:loan_id", get(get_loan))
        .route("/api/loans/:loan_id/confirm", post(confirm_loan))
        .route("/api/loans/:loan_id/audit", get(get_audit_trail))
}
