//! Risk aggregation for emergency loan requests
//!
//! Combines hospital distance, requested amount, incident text severity and
//! image risk into a single 0-100 score (higher is riskier). Every weight,
//! cap and threshold below is lending policy and must stay exact for the
//! decisions to remain comparable across releases.

use serde::{Deserialize, Serialize};

use super::image::MISSING_IMAGE_RISK;
use super::severity::{score_text_severity, HIGH_SEVERITY_SCORE};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Weight for hospital distance in the overall score (0-1)
pub const WEIGHT_DISTANCE: f64 = 0.4;

/// Weight for requested amount in the overall score (0-1)
pub const WEIGHT_AMOUNT: f64 = 0.3;

/// Weight for incident text severity in the overall score (0-1)
pub const WEIGHT_TEXT_SEVERITY: f64 = 0.2;

/// Weight for image risk in the overall score (0-1)
pub const WEIGHT_IMAGE: f64 = 0.1;

/// Distance at which distance risk saturates
pub const DISTANCE_CAP_KM: f64 = 100.0;

/// Amount at which amount risk saturates
pub const AMOUNT_CAP: u64 = 200_000;

/// Highest score that is still approved
pub const APPROVAL_THRESHOLD: u8 = 60;

/// Ceiling for the risk-adjusted approved amount
pub const BASE_APPROVED_AMOUNT: u64 = 50_000;

const DISTANCE_FLAG_KM: f64 = 50.0;
const AMOUNT_FLAG: u64 = 100_000;
const IMAGE_FLAG_RISK: f64 = 0.5;

// ============================================================================
// Data Models
// ============================================================================

/// Normalized inputs, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskFactors {
    pub distance_risk: f64,
    pub amount_risk: f64,
    pub text_severity: f64,
    pub image_risk: f64,
}

/// Outcome of a risk computation; created fresh per request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    /// 0-100, higher is riskier
    pub score: u8,
    pub approved: bool,
    pub approved_amount: u64,
    pub reasons: Vec<String>,
    pub factors: RiskFactors,
}

/// `min(d / 100, 1)`; negative distances count as zero
pub fn distance_risk(distance_km: f64) -> f64 {
    (distance_km.max(0.0) / DISTANCE_CAP_KM).min(1.0)
}

/// `min(a / 200000, 1)`
pub fn amount_risk(amount: u64) -> f64 {
    (amount as f64 / AMOUNT_CAP as f64).min(1.0)
}

/// Weighted sum scaled to 0-100 and rounded
pub fn weighted_score(factors: &RiskFactors) -> u8 {
    let raw = factors.distance_risk * WEIGHT_DISTANCE
        + factors.amount_risk * WEIGHT_AMOUNT
        + factors.text_severity * WEIGHT_TEXT_SEVERITY
        + factors.image_risk * WEIGHT_IMAGE;

    (raw * 100.0).round().clamp(0.0, 100.0) as u8
}

/// `min(requested, floor(base * (1 - score / 100)))` when approved, else 0
pub fn approved_amount(requested: u64, score: u8, approved: bool) -> u64 {
    if !approved {
        return 0;
    }
    let adjusted = BASE_APPROVED_AMOUNT * u64::from(100 - score.min(100)) / 100;
    requested.min(adjusted)
}

/// Score a request.
///
/// `image_risk` is `None` when no image was submitted; the missing image
/// then counts as [`MISSING_IMAGE_RISK`].
pub fn compute_risk(
    distance_km: f64,
    amount: u64,
    text: &str,
    image_risk: Option<f64>,
) -> RiskAssessment {
    let factors = RiskFactors {
        distance_risk: distance_risk(distance_km),
        amount_risk: amount_risk(amount),
        text_severity: score_text_severity(text),
        image_risk: image_risk.unwrap_or(MISSING_IMAGE_RISK).clamp(0.0, 1.0),
    };

    let score = weighted_score(&factors);
    let approved = score <= APPROVAL_THRESHOLD;

    let mut reasons = Vec::new();
    if distance_km > DISTANCE_FLAG_KM {
        reasons.push(format!(
            "Hospital is {:.1} km away (more than {} km)",
            distance_km, DISTANCE_FLAG_KM
        ));
    }
    if amount > AMOUNT_FLAG {
        reasons.push(format!("Requested amount exceeds {}", AMOUNT_FLAG));
    }
    if factors.text_severity >= HIGH_SEVERITY_SCORE {
        reasons.push("Incident description indicates high severity".to_string());
    }
    match image_risk {
        None => reasons.push("Accident image not provided".to_string()),
        Some(risk) if risk >= IMAGE_FLAG_RISK => {
            reasons.push("Accident image could not be verified".to_string())
        }
        Some(_) => {}
    }
    if !approved {
        reasons.push(format!(
            "Risk score {} exceeds approval threshold {}",
            score, APPROVAL_THRESHOLD
        ));
    }

    RiskAssessment {
        score,
        approved,
        approved_amount: approved_amount(amount, score, approved),
        reasons,
        factors,
    }
}
