//! Final approval tests
//!
//! Every clause of the approval policy is exercised in isolation with the
//! others satisfied, plus the state machine, throttle and idempotency rules.

mod common;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use medloan_server::error::ApiError;
use medloan_server::loan::{LoanId, LoanStatus};
use medloan_server::models::FinalApprovalRequest;
use medloan_server::services::documents::KnownHashStore;
use medloan_server::state::{AppState, Backends};
use medloan_server::store::StoreError;

async fn setup() -> (AppState, Backends, LoanId) {
    let (state, backends) = test_state();
    seed_known_hashes(&backends).await;
    let loan_id = seed_pending_loan(&backends).await;
    (state, backends, loan_id)
}

fn parse_request(body: Value) -> FinalApprovalRequest {
    serde_json::from_value(body).unwrap()
}

async fn finalize(state: &AppState, body: Value) -> Result<Value, ApiError> {
    let raw = state
        .approval_service
        .finalize(parse_request(body), Some("203.0.113.5".to_string()))
        .await?;
    Ok(serde_json::from_str(&raw).unwrap())
}

fn complete_documents() -> Vec<Value> {
    vec![
        document("FIR", VALID_FIR, FIR_HASH),
        document("MEDICAL_REPORT", SERIOUS_REPORT, MEDICAL_HASH),
    ]
}

fn reasons(response: &Value) -> Vec<String> {
    response["rejectionReasons"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|r| r.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

// ============================================================================
// Policy clauses
// ============================================================================

#[tokio::test]
async fn test_all_clauses_satisfied_approves_with_tier_amount() {
    let (state, backends, loan_id) = setup().await;

    let response = finalize(&state, approval_body(&loan_id, complete_documents()))
        .await
        .unwrap();

    assert_eq!(response["approved"], true);
    assert_eq!(response["approvedAmount"], 250_000);
    assert!(response.get("rejectionReasons").is_none());
    assert_eq!(response["documentStatus"]["FIR"], "VALID");
    assert_eq!(response["documentStatus"]["MEDICAL_REPORT"], "VALID");
    assert!(!response["nextSteps"].as_array().unwrap().is_empty());

    let loan = backends.loans.get(&loan_id).await.unwrap().unwrap();
    assert_eq!(loan.status, LoanStatus::Approved);
}

#[tokio::test]
async fn test_invalid_fir_format_rejects() {
    let (state, backends, loan_id) = setup().await;

    let response = finalize(
        &state,
        approval_body(
            &loan_id,
            vec![
                document("FIR", FIR_WITHOUT_NUMBER, FIR_HASH),
                document("MEDICAL_REPORT", SERIOUS_REPORT, MEDICAL_HASH),
            ],
        ),
    )
    .await
    .unwrap();

    assert_eq!(response["approved"], false);
    assert!(response["approvedAmount"].is_null());
    assert_eq!(response["documentStatus"]["FIR"], "INVALID");
    assert_eq!(response["documentStatus"]["MEDICAL_REPORT"], "VALID");
    assert!(reasons(&response)
        .iter()
        .any(|r| r.starts_with("FIR format invalid")));

    let loan = backends.loans.get(&loan_id).await.unwrap().unwrap();
    assert_eq!(loan.status, LoanStatus::Rejected);
}

#[tokio::test]
async fn test_incomplete_medical_report_rejects() {
    let (state, _, loan_id) = setup().await;

    let response = finalize(
        &state,
        approval_body(
            &loan_id,
            vec![
                document("FIR", VALID_FIR, FIR_HASH),
                document("MEDICAL_REPORT", INCOMPLETE_REPORT, MEDICAL_HASH),
            ],
        ),
    )
    .await
    .unwrap();

    assert_eq!(response["approved"], false);
    assert_eq!(response["documentStatus"]["MEDICAL_REPORT"], "INVALID");
    assert!(reasons(&response)
        .iter()
        .any(|r| r.starts_with("Medical report incomplete")));
}

#[tokio::test]
async fn test_inconsistent_dates_reject() {
    let (state, _, loan_id) = setup().await;

    let response = finalize(
        &state,
        approval_body(
            &loan_id,
            vec![
                document("FIR", VALID_FIR, FIR_HASH),
                document("MEDICAL_REPORT", STALE_REPORT, MEDICAL_HASH),
            ],
        ),
    )
    .await
    .unwrap();

    assert_eq!(response["approved"], false);
    // Both documents are individually fine.
    assert_eq!(response["documentStatus"]["FIR"], "VALID");
    assert_eq!(response["documentStatus"]["MEDICAL_REPORT"], "VALID");
    assert!(reasons(&response)
        .iter()
        .any(|r| r.contains("dates inconsistent")));
}

#[tokio::test]
async fn test_moderate_severity_report_is_valid_but_rejected() {
    let (state, _, loan_id) = setup().await;

    let response = finalize(
        &state,
        approval_body(
            &loan_id,
            vec![
                document("FIR", VALID_FIR, FIR_HASH),
                document("MEDICAL_REPORT", MODERATE_REPORT, MEDICAL_HASH),
            ],
        ),
    )
    .await
    .unwrap();

    // Three of four terms is enough; tier 3 is not.
    assert_eq!(response["documentStatus"]["MEDICAL_REPORT"], "VALID");
    assert_eq!(response["approved"], false);
    assert!(response["approvedAmount"].is_null());
    assert!(reasons(&response).iter().any(|r| r.contains("tier 3")));
}

#[tokio::test]
async fn test_unknown_hash_rejects_otherwise_valid_document() {
    let (state, _, loan_id) = setup().await;

    let response = finalize(
        &state,
        approval_body(
            &loan_id,
            vec![
                document("FIR", VALID_FIR, UNKNOWN_HASH),
                document("MEDICAL_REPORT", SERIOUS_REPORT, MEDICAL_HASH),
            ],
        ),
    )
    .await
    .unwrap();

    assert_eq!(response["approved"], false);
    assert_eq!(response["documentStatus"]["FIR"], "INVALID");
    assert_eq!(
        reasons(&response),
        vec!["FIR hash does not match any uploaded document".to_string()]
    );
}

#[tokio::test]
async fn test_unregistered_fir_number_is_its_own_reason() {
    let (state, _, loan_id) = setup().await;
    let fir = VALID_FIR.replace("123/2024", "999/2024");

    let response = finalize(
        &state,
        approval_body(
            &loan_id,
            vec![
                document("FIR", &fir, FIR_HASH),
                document("MEDICAL_REPORT", SERIOUS_REPORT, MEDICAL_HASH),
            ],
        ),
    )
    .await
    .unwrap();

    let reasons = reasons(&response);
    assert_eq!(response["approved"], false);
    assert!(reasons.iter().any(|r| r.contains("not found in police registry")));
    assert!(!reasons.iter().any(|r| r.starts_with("FIR format invalid")));
}

#[tokio::test]
async fn test_missing_fir_is_reported() {
    let (state, _, loan_id) = setup().await;

    let response = finalize(
        &state,
        approval_body(
            &loan_id,
            vec![document("MEDICAL_REPORT", SERIOUS_REPORT, MEDICAL_HASH)],
        ),
    )
    .await
    .unwrap();

    assert_eq!(response["approved"], false);
    assert_eq!(response["documentStatus"]["FIR"], "MISSING");
    assert!(reasons(&response).contains(&"FIR document missing".to_string()));
}

// ============================================================================
// State machine, throttle and idempotency
// ============================================================================

#[tokio::test]
async fn test_processed_loan_conflicts() {
    let (state, _, loan_id) = setup().await;
    finalize(&state, approval_body(&loan_id, complete_documents()))
        .await
        .unwrap();

    let mut retry = approval_body(&loan_id, complete_documents());
    retry["hospitalPlaceId"] = Value::from(FAR_HOSPITAL);
    let err = finalize(&state, retry).await.unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));
}

#[tokio::test]
async fn test_replay_returns_byte_identical_body() {
    let (state, _, loan_id) = setup().await;
    let body = approval_body(&loan_id, complete_documents());

    let first = state
        .approval_service
        .finalize(parse_request(body.clone()), None)
        .await
        .unwrap();
    let second = state
        .approval_service
        .finalize(parse_request(body), None)
        .await
        .unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_fourth_attempt_within_hour_is_throttled() {
    let (state, _, loan_id) = setup().await;

    // Unknown hospitals fail after admission, so each attempt still counts.
    for i in 0..3 {
        let mut body = approval_body(&loan_id, complete_documents());
        body["hospitalPlaceId"] = Value::from(format!("ChIJ-attempt-{}", i));
        let result = finalize(&state, body).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    let err = finalize(&state, approval_body(&loan_id, complete_documents()))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::RateLimited { .. }));

    let trail = state.loan_service.audit_trail(loan_id.as_str()).await.unwrap();
    assert_eq!(trail.len(), 4);
    assert_eq!(trail.last().unwrap().status, "RATE_LIMITED");
}

#[tokio::test]
async fn test_unknown_loan_is_not_found() {
    let (state, _, _) = setup().await;
    let ghost = LoanId::parse("loan-1000000000000-0001").unwrap();

    let err = finalize(&state, approval_body(&ghost, complete_documents()))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn test_malformed_request_is_rejected_before_any_lookup() {
    let (state, _, loan_id) = setup().await;

    let err = finalize(
        &state,
        approval_body(&loan_id, vec![document("FIR", "too short", FIR_HASH)]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::ValidationError(_)));

    // Nothing was counted or audited for the loan.
    let trail = state.loan_service.audit_trail(loan_id.as_str()).await.unwrap();
    assert!(trail.is_empty());
}

#[tokio::test]
async fn test_outcome_is_audited_with_actor() {
    let (state, _, loan_id) = setup().await;
    finalize(&state, approval_body(&loan_id, complete_documents()))
        .await
        .unwrap();

    let trail = state.loan_service.audit_trail(loan_id.as_str()).await.unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].status, "APPROVED");
    assert_eq!(trail[0].action, "final_approval");
    assert_eq!(trail[0].actor_ip.as_deref(), Some("203.0.113.5"));
}

// ============================================================================
// Critical dependency failure
// ============================================================================

struct BrokenHashStore;

#[async_trait]
impl KnownHashStore for BrokenHashStore {
    async fn contains(&self, _hash: &str) -> Result<bool, StoreError> {
        Err(StoreError::Backend("connection reset".to_string()))
    }

    async fn register(&self, _hash: &str) -> Result<bool, StoreError> {
        Err(StoreError::Backend("connection reset".to_string()))
    }
}

#[tokio::test]
async fn test_hash_store_outage_aborts_with_dependency_unavailable() {
    let mut backends = Backends::in_memory();
    backends.known_hashes = Arc::new(BrokenHashStore);
    let state = AppState::new(&test_config(), backends.clone(), collaborators());
    let loan_id = seed_pending_loan(&backends).await;

    let err = finalize(&state, approval_body(&loan_id, complete_documents()))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::DependencyUnavailable(_)));

    // The loan stays open and the failure is on record.
    let loan = backends.loans.get(&loan_id).await.unwrap().unwrap();
    assert_eq!(loan.status, LoanStatus::PendingApproval);
    let trail = state.loan_service.audit_trail(loan_id.as_str()).await.unwrap();
    assert_eq!(trail.last().unwrap().status, "ERROR");
}

// ============================================================================
// Timing and concurrency
// ============================================================================

#[tokio::test]
async fn test_slow_commit_is_not_reported_as_timeout() {
    let mut config = test_config();
    config.request_timeout = Duration::from_millis(150);
    let mut backends = Backends::in_memory();
    backends.loans = Arc::new(SlowTransitionRepository {
        stall: Duration::from_millis(300),
        ..Default::default()
    });
    let state = AppState::new(&config, backends.clone(), collaborators());
    seed_known_hashes(&backends).await;
    let loan_id = seed_pending_loan(&backends).await;
    let body = approval_body(&loan_id, complete_documents());

    let first = state
        .approval_service
        .finalize(parse_request(body.clone()), None)
        .await
        .unwrap();
    let decision: Value = serde_json::from_str(&first).unwrap();
    assert_eq!(decision["approved"], true);

    let loan = backends.loans.get(&loan_id).await.unwrap().unwrap();
    assert_eq!(loan.status, LoanStatus::Approved);
    let trail = state.loan_service.audit_trail(loan_id.as_str()).await.unwrap();
    assert_eq!(trail.last().unwrap().status, "APPROVED");

    // The stored decision is what a retry sees.
    let retry = state
        .approval_service
        .finalize(parse_request(body), None)
        .await
        .unwrap();
    assert_eq!(retry, first);
}

#[tokio::test]
async fn test_concurrent_identical_requests_share_one_decision() {
    let mut collaborators = collaborators();
    collaborators.fir_registry = Arc::new(SlowRegistry {
        delay: Duration::from_millis(50),
    });
    let backends = Backends::in_memory();
    let state = AppState::new(&test_config(), backends.clone(), collaborators);
    seed_known_hashes(&backends).await;
    let loan_id = seed_pending_loan(&backends).await;
    let body = approval_body(&loan_id, complete_documents());

    let (a, b) = tokio::join!(
        state
            .approval_service
            .finalize(parse_request(body.clone()), Some("203.0.113.5".to_string())),
        state
            .approval_service
            .finalize(parse_request(body), Some("203.0.113.6".to_string())),
    );

    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a, b);

    let trail = state.loan_service.audit_trail(loan_id.as_str()).await.unwrap();
    let approvals = trail.iter().filter(|e| e.status == "APPROVED").count();
    assert_eq!(approvals, 1);
    assert!(trail.iter().all(|e| e.status != "ERROR"));
}
