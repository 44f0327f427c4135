//! Risk pipeline tests
//!
//! Drives `RiskService` end to end over in-memory stores with a fixed
//! geocoder, checking the scoring policy against worked scenarios.

mod common;

use async_trait::async_trait;
use axum::http::HeaderMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use base64::{engine::general_purpose::STANDARD, Engine as _};

use common::*;
use medloan_server::error::ApiError;
use medloan_server::loan::{InMemoryLoanRepository, LoanId, LoanRecord, LoanRepository, LoanStatus};
use medloan_server::models::RiskScoreRequest;
use medloan_server::services::risk_engine::{compute_risk, BASE_APPROVED_AMOUNT};
use medloan_server::services::severity::{score_text_severity, HIGH_SEVERITY_SCORE};
use medloan_server::state::{AppState, Backends};
use medloan_server::store::StoreError;

fn request(hospital: &str, amount: u64, details: &str) -> RiskScoreRequest {
    RiskScoreRequest {
        aadhaar_number: AADHAAR.to_string(),
        hospital_place_id: hospital.to_string(),
        accident_details: details.to_string(),
        loan_amount: amount,
        accident_image: None,
        user_location: Some(APPLICANT),
        incident_date: None,
    }
}

// ============================================================================
// Worked scenarios
// ============================================================================

#[tokio::test]
async fn test_scenario_a_small_nearby_minor_request_is_approved() {
    let (state, backends) = test_state();

    let response = state
        .risk_service
        .assess(request(HOSPITAL, 50_000, "minor bruise"), &HeaderMap::new())
        .await
        .unwrap();

    // 0.1*0.4 + 0.25*0.3 + 0.2*0.2 + 0.5*0.1 = 0.205
    assert!((20..=21).contains(&response.risk_score), "score {}", response.risk_score);
    assert!(response.approved);
    assert_eq!(
        response.approved_amount,
        BASE_APPROVED_AMOUNT * u64::from(100 - response.risk_score) / 100
    );
    assert_eq!(response.distance_km, 10.0);
    assert!(response.image_analysis.is_none());
    assert!(response
        .reasons
        .iter()
        .any(|r| r == "Accident image not provided"));

    let loan = backends.loans.get(&response.loan_id).await.unwrap().unwrap();
    assert_eq!(loan.status, LoanStatus::Confirmed);
    assert_eq!(loan.risk_score, Some(response.risk_score));
}

#[tokio::test]
async fn test_scenario_b_large_distant_critical_request_is_rejected() {
    let (state, backends) = test_state();

    let response = state
        .risk_service
        .assess(
            request(FAR_HOSPITAL, 500_000, "critical trauma surgery"),
            &HeaderMap::new(),
        )
        .await
        .unwrap();

    assert!(response.risk_score >= 86);
    assert!(!response.approved);
    assert_eq!(response.approved_amount, 0);
    assert_eq!(response.distance_km, 150.0);

    let loan = backends.loans.get(&response.loan_id).await.unwrap().unwrap();
    assert_eq!(loan.status, LoanStatus::Rejected);

    let trail = state
        .loan_service
        .audit_trail(response.loan_id.as_str())
        .await
        .unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].status, "REJECTED");
    assert!(trail[0].reason.as_deref().unwrap().contains("exceeds approval threshold"));
}

#[test]
fn test_high_severity_keyword_outranks_low_severity_keyword() {
    // Keyword tiers are a heuristic policy: high > low > medium > default.
    assert_eq!(
        score_text_severity("minor scratch but heavy bleeding"),
        HIGH_SEVERITY_SCORE
    );
    let assessment = compute_risk(10.0, 50_000, "minor scratch but heavy bleeding", None);
    assert!(assessment
        .reasons
        .iter()
        .any(|r| r.contains("high severity")));
}

#[test]
fn test_score_is_bounded_and_threshold_decides_approval() {
    for km in [0.0, 25.0, 50.0, 99.0, 100.0, 400.0] {
        for amount in [1_000, 100_000, 200_000, 500_000] {
            for text in ["", "minor bruise", "swelling", "severe trauma"] {
                for image in [None, Some(0.0), Some(0.6), Some(1.0)] {
                    let a = compute_risk(km, amount, text, image);
                    assert!(a.score <= 100);
                    assert_eq!(a.approved, a.score <= 60);
                    if !a.approved {
                        assert_eq!(a.approved_amount, 0);
                    }
                }
            }
        }
    }
}

// ============================================================================
// Image handling
// ============================================================================

#[tokio::test]
async fn test_invalid_image_raises_image_risk_but_never_fails() {
    let (state, _) = test_state();

    let mut req = request(HOSPITAL, 50_000, "minor bruise");
    req.accident_image = Some(STANDARD.encode(b"definitely not an image, just text bytes"));

    let response = state
        .risk_service
        .assess(req, &HeaderMap::new())
        .await
        .unwrap();

    let analysis = response.image_analysis.expect("image analysis present");
    assert_eq!(analysis.top_class, "invalid_format");
    assert_eq!(analysis.risk_factor, 1.0);
}

#[tokio::test]
async fn test_undecodable_image_degrades_to_unavailable() {
    let (state, _) = test_state();

    let mut req = request(HOSPITAL, 50_000, "minor bruise");
    req.accident_image = Some("%%% not base64 %%%".to_string());

    let response = state
        .risk_service
        .assess(req, &HeaderMap::new())
        .await
        .unwrap();

    let analysis = response.image_analysis.expect("image analysis present");
    assert_eq!(analysis.risk_factor, 0.6);
}

// ============================================================================
// Failures and throttling
// ============================================================================

#[tokio::test]
async fn test_unknown_hospital_is_not_found() {
    let (state, _) = test_state();
    let err = state
        .risk_service
        .assess(request("ChIJ-nowhere", 50_000, "minor bruise"), &HeaderMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn test_validation_runs_before_anything_else() {
    let (state, _) = test_state();

    let mut req = request("ChIJ-nowhere", 50_000, "minor bruise");
    req.aadhaar_number = "1234".to_string();

    let err = state
        .risk_service
        .assess(req, &HeaderMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::ValidationError(_)));
}

#[tokio::test]
async fn test_sixth_request_for_same_identity_within_hour_is_refused() {
    let (state, _) = test_state();

    for _ in 0..5 {
        state
            .risk_service
            .assess(request(HOSPITAL, 50_000, "minor bruise"), &HeaderMap::new())
            .await
            .unwrap();
    }

    let err = state
        .risk_service
        .assess(request(HOSPITAL, 50_000, "minor bruise"), &HeaderMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::RateLimited { .. }));

    let mut other = request(HOSPITAL, 50_000, "minor bruise");
    other.aadhaar_number = "210987654321".to_string();
    assert!(state
        .risk_service
        .assess(other, &HeaderMap::new())
        .await
        .is_ok());
}

#[tokio::test]
async fn test_edge_headers_locate_applicant_without_explicit_location() {
    let (state, _) = test_state();

    let hospital = point_north_of(APPLICANT, 10.0);
    let mut headers = HeaderMap::new();
    headers.insert(
        "x-vercel-ip-latitude",
        hospital.lat.to_string().parse().unwrap(),
    );
    headers.insert(
        "x-vercel-ip-longitude",
        hospital.lng.to_string().parse().unwrap(),
    );

    let mut req = request(HOSPITAL, 50_000, "minor bruise");
    req.user_location = None;

    let response = state.risk_service.assess(req, &headers).await.unwrap();
    assert_eq!(response.distance_km, 0.0);
}

// ============================================================================
// Persistence
// ============================================================================

/// Repository that reports the first id it sees as already taken
#[derive(Default)]
struct FirstIdTaken {
    inner: InMemoryLoanRepository,
    refused: AtomicBool,
}

#[async_trait]
impl LoanRepository for FirstIdTaken {
    async fn insert(&self, loan: &LoanRecord) -> Result<bool, StoreError> {
        if !self.refused.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        self.inner.insert(loan).await
    }

    async fn get(&self, id: &LoanId) -> Result<Option<LoanRecord>, StoreError> {
        self.inner.get(id).await
    }

    async fn transition(
        &self,
        id: &LoanId,
        from: LoanStatus,
        to: LoanStatus,
    ) -> Result<bool, StoreError> {
        self.inner.transition(id, from, to).await
    }
}

#[tokio::test]
async fn test_taken_loan_id_is_replaced_with_a_fresh_one() {
    let mut backends = Backends::in_memory();
    backends.loans = Arc::new(FirstIdTaken::default());
    let state = AppState::new(&test_config(), backends.clone(), collaborators());

    let response = state
        .risk_service
        .assess(request(HOSPITAL, 50_000, "minor bruise"), &HeaderMap::new())
        .await
        .unwrap();

    let loan = backends.loans.get(&response.loan_id).await.unwrap().unwrap();
    assert_eq!(loan.status, LoanStatus::Confirmed);
}

#[tokio::test]
async fn test_slow_commit_still_returns_the_opened_loan() {
    let mut config = test_config();
    config.request_timeout = Duration::from_millis(150);
    let mut backends = Backends::in_memory();
    backends.loans = Arc::new(SlowTransitionRepository {
        stall: Duration::from_millis(300),
        ..Default::default()
    });
    let state = AppState::new(&config, backends.clone(), collaborators());

    let response = state
        .risk_service
        .assess(request(HOSPITAL, 50_000, "minor bruise"), &HeaderMap::new())
        .await
        .unwrap();

    let loan = backends.loans.get(&response.loan_id).await.unwrap().unwrap();
    assert_eq!(loan.status, LoanStatus::Confirmed);
    let trail = state
        .loan_service
        .audit_trail(response.loan_id.as_str())
        .await
        .unwrap();
    assert_eq!(trail.len(), 1);
}
