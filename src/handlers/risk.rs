//! Risk scoring API handlers

use axum::{extract::State, http::HeaderMap, Json};
use std::sync::Arc;

use super::json::AppJson;
use crate::error::ApiError;
use crate::models::{RiskScoreRequest, RiskScoreResponse};
use crate::services::RiskService;

/// POST /api/risk-score - Score an emergency loan request
pub async fn assess_risk(
    State(risk_service): State<Arc<RiskService>>,
    headers: HeaderMap,
    AppJson(request): AppJson<RiskScoreRequest>,
) -> Result<Json<RiskScoreResponse>, ApiError> {
    let response = risk_service.assess(request, &headers).await?;
    Ok(Json(response))
}
