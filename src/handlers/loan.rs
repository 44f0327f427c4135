//! Loan lifecycle API handlers

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use super::json::AppJson;
use crate::audit::AuditEntry;
use crate::error::ApiError;
use crate::loan::LoanRecord;
use crate::loan_service::LoanService;
use crate::middleware::client_ip;
use crate::models::{ApiResponse, ConfirmLoanRequest, ConfirmLoanResponse, FinalApprovalRequest};
use crate::services::ApprovalService;

/// GET /api/loans/:loan_id - Get a loan by id
pub async fn get_loan(
    State(loan_service): State<Arc<LoanService>>,
    Path(loan_id): Path<String>,
) -> Result<Json<ApiResponse<LoanRecord>>, ApiError> {
    let loan = loan_service.get_loan(&loan_id).await?;
    Ok(Json(ApiResponse::ok(loan)))
}

/// POST /api/loans/:loan_id/confirm - Applicant confirms a risk-approved loan
pub async fn confirm_loan(
    State(loan_service): State<Arc<LoanService>>,
    Path(loan_id): Path<String>,
    headers: HeaderMap,
    AppJson(request): AppJson<ConfirmLoanRequest>,
) -> Result<Json<ConfirmLoanResponse>, ApiError> {
    let response = loan_service
        .confirm_loan(&loan_id, request, client_ip(&headers))
        .await?;
    Ok(Json(response))
}

/// GET /api/loans/:loan_id/audit - Audit trail, oldest first
pub async fn get_audit_trail(
    State(loan_service): State<Arc<LoanService>>,
    Path(loan_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<AuditEntry>>>, ApiError> {
    let entries = loan_service.audit_trail(&loan_id).await?;
    Ok(Json(ApiResponse::ok(
        entries.into_iter().map(AuditEntry::redacted).collect(),
    )))
}

/// POST /api/loans/final-approval - Decide a loan against its documents
///
/// The body is written out exactly as stored so replays match byte for byte.
pub async fn final_approval(
    State(approval_service): State<Arc<ApprovalService>>,
    headers: HeaderMap,
    AppJson(request): AppJson<FinalApprovalRequest>,
) -> Result<Response, ApiError> {
    let body = approval_service
        .finalize(request, client_ip(&headers))
        .await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}
