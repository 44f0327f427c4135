//! Request and response bodies for the HTTP surface

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::geo::Coordinates;
use crate::loan::LoanId;
use crate::services::documents::{DocumentStatusMap, DocumentType};
use crate::services::image::ImageAnalysis;

pub const MIN_LOAN_AMOUNT: u64 = 1_000;
pub const MAX_LOAN_AMOUNT: u64 = 500_000;

/// Generic API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

fn validate_aadhaar(value: &str) -> Result<(), ValidationError> {
    if value.len() == 12 && value.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::new("aadhaar_must_be_12_digits"))
    }
}

fn validate_loan_id(value: &str) -> Result<(), ValidationError> {
    if LoanId::is_well_formed(value) {
        Ok(())
    } else {
        Err(ValidationError::new("malformed_loan_id"))
    }
}

fn validate_sha256_hex(value: &str) -> Result<(), ValidationError> {
    if value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(ValidationError::new("hash_must_be_64_hex_chars"))
    }
}

fn validate_coordinates(value: &Coordinates) -> Result<(), ValidationError> {
    if value.is_valid() {
        Ok(())
    } else {
        Err(ValidationError::new("coordinates_out_of_range"))
    }
}

// ===== Risk score =====

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RiskScoreRequest {
    #[validate(custom = "validate_aadhaar")]
    pub aadhaar_number: String,
    #[validate(length(min = 1, max = 256))]
    pub hospital_place_id: String,
    #[validate(length(min = 1, max = 5000))]
    pub accident_details: String,
    #[validate(range(min = 1000, max = 500000))]
    pub loan_amount: u64,
    /// Base64 image, optionally with a data-URL prefix
    #[serde(default)]
    pub accident_image: Option<String>,
    #[serde(default)]
    #[validate(custom = "validate_coordinates")]
    pub user_location: Option<Coordinates>,
    /// When the incident happened; defaults to submission time
    #[serde(default)]
    pub incident_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskScoreResponse {
    pub approved: bool,
    pub approved_amount: u64,
    pub risk_score: u8,
    pub reasons: Vec<String>,
    pub distance_km: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_analysis: Option<ImageAnalysis>,
    pub loan_id: LoanId,
}

// ===== Loan confirmation =====

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmLoanRequest {
    #[validate(custom = "validate_aadhaar")]
    pub aadhaar_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmLoanResponse {
    pub loan_id: LoanId,
    pub status: crate::loan::LoanStatus,
}

// ===== Final approval =====

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmittedDocument {
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    #[validate(length(min = 50, max = 10000))]
    pub text: String,
    #[validate(custom = "validate_sha256_hex")]
    pub hash: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FinalApprovalRequest {
    #[validate(custom = "validate_loan_id")]
    pub loan_id: String,
    #[validate(length(min = 1, max = 10))]
    pub documents: Vec<SubmittedDocument>,
    #[validate(length(min = 1, max = 256))]
    pub hospital_place_id: String,
}

impl FinalApprovalRequest {
    /// Field rules plus every nested document
    pub fn validate_all(&self) -> Result<(), validator::ValidationErrors> {
        self.validate()?;
        for document in &self.documents {
            document.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalApprovalResponse {
    pub approved: bool,
    pub approved_amount: Option<u64>,
    pub next_steps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reasons: Option<Vec<String>>,
    pub document_status: DocumentStatusMap,
}

// ===== Known document hashes =====

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterHashRequest {
    #[validate(custom = "validate_sha256_hex")]
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterHashResponse {
    pub hash: String,
    pub newly_registered: bool,
}
