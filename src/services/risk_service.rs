//! Risk-score pipeline: from an intake request to a scored loan

use axum::http::HeaderMap;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use validator::Validate;

use super::image::{analyze_or_default, ImageAnalysis, ImageAnalyzer};
use super::risk_engine::{compute_risk, RiskAssessment};
use crate::audit::{hash_identity, AuditEntry, AuditTrail, WindowLimiter};
use crate::deadline::Deadline;
use crate::error::{ApiError, ApiResult};
use crate::geo::{haversine_km, round_one_decimal, HospitalLocator, LocationSource, UserLocator};
use crate::loan::{LoanId, LoanRecord, LoanRepository, LoanStatus};
use crate::middleware::client_ip;
use crate::models::{RiskScoreRequest, RiskScoreResponse};

const AUDIT_ACTION: &str = "risk_score";
const MAX_ID_ATTEMPTS: u32 = 3;

/// Scoring output carried into persistence
struct Scored {
    assessment: RiskAssessment,
    distance_km: f64,
    location_source: LocationSource,
    image_analysis: Option<ImageAnalysis>,
}

pub struct RiskService {
    hospitals: HospitalLocator,
    users: UserLocator,
    image_analyzer: Arc<dyn ImageAnalyzer>,
    loans: Arc<dyn LoanRepository>,
    identity_limiter: WindowLimiter,
    audit: AuditTrail,
    identity_salt: String,
    request_timeout: Duration,
    image_timeout: Duration,
}

impl RiskService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        hospitals: HospitalLocator,
        users: UserLocator,
        image_analyzer: Arc<dyn ImageAnalyzer>,
        loans: Arc<dyn LoanRepository>,
        identity_limiter: WindowLimiter,
        audit: AuditTrail,
        identity_salt: String,
        request_timeout: Duration,
        image_timeout: Duration,
    ) -> Self {
        Self {
            hospitals,
            users,
            image_analyzer,
            loans,
            identity_limiter,
            audit,
            identity_salt,
            request_timeout,
            image_timeout,
        }
    }

    pub fn image_analyzer_name(&self) -> &'static str {
        self.image_analyzer.name()
    }

    /// Score an intake request and open a loan for it.
    ///
    /// Validation and the identity throttle run before any external call.
    pub async fn assess(
        &self,
        request: RiskScoreRequest,
        headers: &HeaderMap,
    ) -> ApiResult<RiskScoreResponse> {
        request.validate()?;

        let identity_hash = hash_identity(&request.aadhaar_number, &self.identity_salt);
        self.identity_limiter.check(&identity_hash).await?;

        // The budget bounds lookups and scoring; persistence is never cut short.
        let deadline = Deadline::start(self.request_timeout);
        let scored = deadline
            .run("risk assessment", self.score(&request, headers, &deadline))
            .await?;
        deadline.check("loan persistence")?;

        self.open_loan(request, identity_hash, headers, scored).await
    }

    async fn score(
        &self,
        request: &RiskScoreRequest,
        headers: &HeaderMap,
        deadline: &Deadline,
    ) -> ApiResult<Scored> {
        deadline.check("location and image analysis")?;

        let image = async {
            match request.accident_image.as_deref() {
                Some(payload) => Some(
                    analyze_or_default(self.image_analyzer.as_ref(), payload, self.image_timeout)
                        .await,
                ),
                None => None,
            }
        };

        let (hospital, user, image_analysis) = tokio::join!(
            self.hospitals
                .resolve_hospital_location(&request.hospital_place_id),
            self.users
                .resolve_user_location(request.user_location, headers),
            image,
        );
        let hospital = hospital?;

        deadline.check("risk scoring")?;
        let distance_km = haversine_km(user.coordinates, hospital);
        let assessment = compute_risk(
            distance_km,
            request.loan_amount,
            &request.accident_details,
            image_analysis.as_ref().map(|analysis| analysis.risk_factor),
        );

        Ok(Scored {
            assessment,
            distance_km,
            location_source: user.source,
            image_analysis,
        })
    }

    async fn open_loan(
        &self,
        request: RiskScoreRequest,
        identity_hash: String,
        headers: &HeaderMap,
        scored: Scored,
    ) -> ApiResult<RiskScoreResponse> {
        let Scored {
            assessment,
            distance_km,
            location_source,
            image_analysis,
        } = scored;

        let now = Utc::now();
        let mut loan = LoanRecord {
            id: LoanId::generate(),
            identity_hash,
            requested_amount: request.loan_amount,
            description: request.accident_details,
            hospital_place_id: request.hospital_place_id,
            incident_at: request.incident_date.unwrap_or(now),
            risk_score: Some(assessment.score),
            status: LoanStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        let mut attempts = 1;
        while !self.loans.insert(&loan).await? {
            if attempts >= MAX_ID_ATTEMPTS {
                return Err(ApiError::InternalError(
                    "could not allocate a unique loan id".to_string(),
                ));
            }
            tracing::warn!(loan_id = %loan.id, "Loan id already taken, generating another");
            loan.id = LoanId::generate();
            attempts += 1;
        }

        let status = if assessment.approved {
            LoanStatus::Confirmed
        } else {
            LoanStatus::Rejected
        };
        self.loans
            .transition(&loan.id, LoanStatus::Pending, status)
            .await?;

        tracing::info!(
            loan_id = %loan.id,
            score = assessment.score,
            approved = assessment.approved,
            distance_km = %round_one_decimal(distance_km),
            location_source = ?location_source,
            "Risk assessment completed"
        );

        let mut entry = AuditEntry::new(loan.id.as_str(), AUDIT_ACTION, status.as_str())
            .with_actor(client_ip(headers));
        if !assessment.approved {
            entry = entry.with_reason(assessment.reasons.join("; "));
        }
        self.audit.record(entry).await;

        Ok(RiskScoreResponse {
            approved: assessment.approved,
            approved_amount: assessment.approved_amount,
            risk_score: assessment.score,
            reasons: assessment.reasons,
            distance_km: round_one_decimal(distance_km),
            image_analysis,
            loan_id: loan.id,
        })
    }
}
