//! Known document hash registration

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use validator::Validate;

use super::json::AppJson;
use crate::error::ApiError;
use crate::models::{RegisterHashRequest, RegisterHashResponse};
use crate::services::documents::KnownHashStore;

/// POST /api/documents/hashes - Record the hash of an uploaded document
pub async fn register_document_hash(
    State(known_hashes): State<Arc<dyn KnownHashStore>>,
    AppJson(request): AppJson<RegisterHashRequest>,
) -> Result<(StatusCode, Json<RegisterHashResponse>), ApiError> {
    request.validate()?;

    let hash = request.hash.to_ascii_lowercase();
    let newly_registered = known_hashes.register(&hash).await?;
    tracing::info!(newly_registered, "Document hash registered");

    let status = if newly_registered {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(RegisterHashResponse {
            hash,
            newly_registered,
        }),
    ))
}
