//! Loan service layer - confirmation and lookups

use std::sync::Arc;
use validator::Validate;

use crate::audit::{hash_identity, AttemptCounter, AuditEntry, AuditTrail};
use crate::error::{ApiError, ApiResult};
use crate::loan::{LoanId, LoanRecord, LoanRepository, LoanStatus};
use crate::models::{ConfirmLoanRequest, ConfirmLoanResponse};

const AUDIT_ACTION: &str = "confirm";

/// Loan service for the applicant-facing lifecycle steps
#[derive(Clone)]
pub struct LoanService {
    loans: Arc<dyn LoanRepository>,
    confirmations: AttemptCounter,
    audit: AuditTrail,
    identity_salt: String,
}

impl LoanService {
    pub fn new(
        loans: Arc<dyn LoanRepository>,
        confirmations: AttemptCounter,
        audit: AuditTrail,
        identity_salt: String,
    ) -> Self {
        Self {
            loans,
            confirmations,
            audit,
            identity_salt,
        }
    }

    pub async fn get_loan(&self, loan_id: &str) -> ApiResult<LoanRecord> {
        let id = LoanId::parse(loan_id)?;
        self.loans
            .get(&id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("loan not found: {}", id)))
    }

    /// Move a risk-approved loan on to document review.
    ///
    /// Every attempt counts against a lifetime cap, successful or not.
    pub async fn confirm_loan(
        &self,
        loan_id: &str,
        request: ConfirmLoanRequest,
        actor_ip: Option<String>,
    ) -> ApiResult<ConfirmLoanResponse> {
        request.validate()?;
        let id = LoanId::parse(loan_id)?;

        let loan = self
            .loans
            .get(&id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("loan not found: {}", id)))?;

        if !self.confirmations.record_attempt(id.as_str()).await? {
            self.audit
                .record(
                    AuditEntry::new(id.as_str(), AUDIT_ACTION, "LOCKED")
                        .with_actor(actor_ip)
                        .with_reason("confirmation attempts exhausted"),
                )
                .await;
            return Err(ApiError::TooManyRequests(format!(
                "confirmation attempts exhausted for loan {}",
                id
            )));
        }

        if hash_identity(&request.aadhaar_number, &self.identity_salt) != loan.identity_hash {
            self.audit
                .record(
                    AuditEntry::new(id.as_str(), AUDIT_ACTION, "IDENTITY_MISMATCH")
                        .with_actor(actor_ip),
                )
                .await;
            return Err(ApiError::Forbidden(
                "identity does not match the loan application".to_string(),
            ));
        }

        if !self
            .loans
            .transition(&id, LoanStatus::Confirmed, LoanStatus::PendingApproval)
            .await?
        {
            return Err(ApiError::Conflict(format!(
                "loan {} cannot be confirmed (status {})",
                id, loan.status
            )));
        }

        self.audit
            .record(
                AuditEntry::new(id.as_str(), AUDIT_ACTION, LoanStatus::PendingApproval.as_str())
                    .with_actor(actor_ip),
            )
            .await;
        tracing::info!(loan_id = %id, "Loan confirmed, awaiting documents");

        Ok(ConfirmLoanResponse {
            loan_id: id,
            status: LoanStatus::PendingApproval,
        })
    }

    pub async fn audit_trail(&self, loan_id: &str) -> ApiResult<Vec<AuditEntry>> {
        let id = LoanId::parse(loan_id)?;
        if self.loans.get(&id).await?.is_none() {
            return Err(ApiError::NotFound(format!("loan not found: {}", id)));
        }
        Ok(self.audit.entries(id.as_str()).await?)
    }
}
