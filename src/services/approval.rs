//! Final approval of a confirmed loan against submitted documents

use std::sync::Arc;
use std::time::Duration;

use super::documents::{
    dates_inconsistent, DocumentStatus, DocumentStatusMap, DocumentType, FinalApprovalPolicy,
    FirRegistry, KnownHashStore, DATE_TOLERANCE_HOURS, MAX_APPROVABLE_TIER,
};
use super::severity::{
    amount_for_severity_tier, extract_dates, validate_fir, validate_medical_report, SeverityTier,
    MEDICAL_REPORT_TERMS,
};
use crate::audit::{Admission, AuditEntry, AuditTrail, IdempotencyCache, WindowLimiter};
use crate::deadline::Deadline;
use crate::error::{ApiError, ApiResult};
use crate::geo::HospitalLocator;
use crate::loan::{LoanId, LoanRecord, LoanRepository, LoanStatus};
use crate::models::{FinalApprovalRequest, FinalApprovalResponse, SubmittedDocument};

const AUDIT_ACTION: &str = "final_approval";

/// Findings gathered from the submitted documents
#[derive(Debug, Default)]
struct DocumentFindings {
    status: DocumentStatusMap,
    fir_valid: Option<bool>,
    medical_valid: Option<bool>,
    severity_tier: Option<SeverityTier>,
    dates: Vec<chrono::NaiveDate>,
    reasons: Vec<String>,
}

impl DocumentFindings {
    fn mark(&mut self, doc_type: DocumentType, valid: bool) {
        let current = match doc_type {
            DocumentType::Fir => self.status.fir,
            DocumentType::MedicalReport => self.status.medical_report,
        };
        // One bad copy taints the document type.
        if current != DocumentStatus::Invalid {
            let status = if valid {
                DocumentStatus::Valid
            } else {
                DocumentStatus::Invalid
            };
            self.status.set(doc_type, status);
        }
    }
}

/// Orchestrates the final approval pipeline
pub struct ApprovalService {
    loans: Arc<dyn LoanRepository>,
    hashes: Arc<dyn KnownHashStore>,
    registry: Arc<dyn FirRegistry>,
    hospitals: HospitalLocator,
    limiter: WindowLimiter,
    idempotency: IdempotencyCache,
    audit: AuditTrail,
    request_timeout: Duration,
}

impl ApprovalService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        loans: Arc<dyn LoanRepository>,
        hashes: Arc<dyn KnownHashStore>,
        registry: Arc<dyn FirRegistry>,
        hospitals: HospitalLocator,
        limiter: WindowLimiter,
        idempotency: IdempotencyCache,
        audit: AuditTrail,
        request_timeout: Duration,
    ) -> Self {
        Self {
            loans,
            hashes,
            registry,
            hospitals,
            limiter,
            idempotency,
            audit,
            request_timeout,
        }
    }

    /// Decide a final approval request and return the serialized response.
    ///
    /// Replays of the same (loan, hospital) pair inside the idempotency window
    /// get the stored body back unchanged.
    pub async fn finalize(
        &self,
        request: FinalApprovalRequest,
        actor_ip: Option<String>,
    ) -> ApiResult<String> {
        request.validate_all()?;
        let loan_id = LoanId::parse(&request.loan_id)?;
        let target = request.hospital_place_id.as_str();

        let _in_flight = self.idempotency.lock(loan_id.as_str()).await;

        if let Some(cached) = self.idempotency.get(loan_id.as_str(), target).await? {
            tracing::info!(loan_id = %loan_id, "Returning cached final approval decision");
            return Ok(cached);
        }

        if let Admission::Refused { retry_after } = self.limiter.admit(loan_id.as_str()).await? {
            self.audit
                .record(
                    AuditEntry::new(loan_id.as_str(), AUDIT_ACTION, "RATE_LIMITED")
                        .with_actor(actor_ip)
                        .with_reason("approval attempt limit reached"),
                )
                .await;
            return Err(self.limiter.refusal(retry_after));
        }

        // The budget bounds the checks only; the transition and everything
        // after it always run to completion.
        let deadline = Deadline::start(self.request_timeout);
        let evaluated = deadline
            .run("final approval", self.decide(&loan_id, &request, &deadline))
            .await
            .and_then(|decision| deadline.check("loan transition").map(|()| decision));
        let decision = match evaluated {
            Ok(decision) => decision,
            Err(e) => return Err(self.record_failure(&loan_id, actor_ip, e).await),
        };

        let response = match self.commit(&loan_id, decision).await {
            Ok(Some(response)) => response,
            Ok(None) => {
                // Another instance decided first; its body may already be cached.
                if let Some(cached) = self.idempotency.get(loan_id.as_str(), target).await? {
                    return Ok(cached);
                }
                let conflict =
                    ApiError::Conflict(format!("loan {} already processed", loan_id));
                return Err(self.record_failure(&loan_id, actor_ip, conflict).await);
            }
            Err(e) => return Err(self.record_failure(&loan_id, actor_ip, e).await),
        };

        let body = serde_json::to_string(&response)?;

        let status = if response.approved {
            LoanStatus::Approved
        } else {
            LoanStatus::Rejected
        };
        let mut entry =
            AuditEntry::new(loan_id.as_str(), AUDIT_ACTION, status.as_str()).with_actor(actor_ip);
        if let Some(reasons) = &response.rejection_reasons {
            entry = entry.with_reason(reasons.join("; "));
        }
        self.audit.record(entry).await;

        if let Err(e) = self.idempotency.put(loan_id.as_str(), target, &body).await {
            tracing::error!(loan_id = %loan_id, error = %e, "Failed to cache final approval decision");
        }

        Ok(body)
    }

    async fn record_failure(
        &self,
        loan_id: &LoanId,
        actor_ip: Option<String>,
        error: ApiError,
    ) -> ApiError {
        self.audit
            .record(
                AuditEntry::new(loan_id.as_str(), AUDIT_ACTION, "ERROR")
                    .with_actor(actor_ip)
                    .with_reason(error.audit_reason()),
            )
            .await;
        error
    }

    async fn decide(
        &self,
        loan_id: &LoanId,
        request: &FinalApprovalRequest,
        deadline: &Deadline,
    ) -> ApiResult<FinalApprovalResponse> {
        deadline.check("loan lookup")?;
        let loan = self
            .loans
            .get(loan_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("loan not found: {}", loan_id)))?;

        if loan.status != LoanStatus::PendingApproval {
            return Err(ApiError::Conflict(format!(
                "loan {} already processed (status {})",
                loan_id, loan.status
            )));
        }

        deadline.check("hospital resolution")?;
        self.hospitals
            .resolve_hospital_location(&request.hospital_place_id)
            .await?;

        let mut findings = DocumentFindings::default();
        if request.hospital_place_id != loan.hospital_place_id {
            findings
                .reasons
                .push("Hospital does not match the loan application".to_string());
        }

        for document in &request.documents {
            deadline.check("document checks")?;
            self.check_document(document, &mut findings).await?;
        }

        Ok(Self::conclude(&loan, findings))
    }

    /// Apply the decision to the loan; `None` when it was no longer pending
    async fn commit(
        &self,
        loan_id: &LoanId,
        response: FinalApprovalResponse,
    ) -> ApiResult<Option<FinalApprovalResponse>> {
        let to = if response.approved {
            LoanStatus::Approved
        } else {
            LoanStatus::Rejected
        };

        if !self
            .loans
            .transition(loan_id, LoanStatus::PendingApproval, to)
            .await?
        {
            return Ok(None);
        }

        tracing::info!(
            loan_id = %loan_id,
            approved = response.approved,
            approved_amount = ?response.approved_amount,
            "Final approval decided"
        );
        Ok(Some(response))
    }

    async fn check_document(
        &self,
        document: &SubmittedDocument,
        findings: &mut DocumentFindings,
    ) -> ApiResult<()> {
        // Hash store failures abort the whole request.
        let hash_known = self.hashes.contains(&document.hash).await?;
        let label = match document.doc_type {
            DocumentType::Fir => "FIR",
            DocumentType::MedicalReport => "Medical report",
        };
        if !hash_known {
            findings
                .reasons
                .push(format!("{} hash does not match any uploaded document", label));
        }

        findings.dates.extend(extract_dates(&document.text));

        let content_valid = match document.doc_type {
            DocumentType::Fir => {
                let fir = validate_fir(&document.text);
                findings.fir_valid = Some(findings.fir_valid.unwrap_or(true) && fir.valid);

                match fir.fir_number {
                    None => {
                        findings
                            .reasons
                            .push("FIR format invalid: no recognizable FIR/case number".to_string());
                        false
                    }
                    Some(number) => match self.registry.verify(&number).await {
                        Ok(true) => true,
                        Ok(false) => {
                            findings
                                .reasons
                                .push(format!("FIR {} not found in police registry", number));
                            false
                        }
                        Err(e) => {
                            tracing::warn!(fir_number = %number, error = %e, "FIR registry check failed");
                            findings
                                .reasons
                                .push(format!("FIR {} could not be verified with police registry", number));
                            false
                        }
                    },
                }
            }
            DocumentType::MedicalReport => {
                let report = validate_medical_report(&document.text);
                findings.medical_valid =
                    Some(findings.medical_valid.unwrap_or(true) && report.valid);
                findings.severity_tier = Some(
                    findings
                        .severity_tier
                        .map_or(report.severity_tier, |tier| tier.max(report.severity_tier)),
                );
                if !report.valid {
                    findings.reasons.push(format!(
                        "Medical report incomplete: {} of {} required terms present",
                        report.matched_terms,
                        MEDICAL_REPORT_TERMS.len()
                    ));
                }
                report.valid
            }
        };

        findings.mark(document.doc_type, hash_known && content_valid);
        Ok(())
    }

    fn conclude(loan: &LoanRecord, mut findings: DocumentFindings) -> FinalApprovalResponse {
        if findings.fir_valid.is_none() {
            findings.reasons.push("FIR document missing".to_string());
        }
        if findings.medical_valid.is_none() {
            findings.reasons.push("Medical report missing".to_string());
        }

        let inconsistent = dates_inconsistent(&findings.dates, loan.incident_at);
        if inconsistent {
            findings.reasons.push(format!(
                "Document dates inconsistent: more than {} hours from the incident",
                DATE_TOLERANCE_HOURS
            ));
        }

        let tier = findings.severity_tier.unwrap_or(SeverityTier::MODERATE);
        let approved = FinalApprovalPolicy::is_approved(
            findings.fir_valid.unwrap_or(false),
            findings.medical_valid.unwrap_or(false),
            inconsistent,
            tier,
            &findings.reasons,
        );
        if tier > MAX_APPROVABLE_TIER && findings.medical_valid == Some(true) {
            findings.reasons.push(format!(
                "Injury severity tier {} is below the emergency threshold",
                tier.0
            ));
        }

        tracing::debug!(
            loan_id = %loan.id,
            approved,
            tier = tier.0,
            reasons = findings.reasons.len(),
            "Documents evaluated"
        );

        let approved_amount = approved.then(|| amount_for_severity_tier(tier));
        let next_steps = match approved_amount {
            Some(amount) => vec![
                format!("Disbursement of {} to the hospital has been scheduled", amount),
                "Keep the original FIR and medical report for verification".to_string(),
            ],
            None => vec![
                "Review the rejection reasons listed above".to_string(),
                "Contact support to appeal the decision".to_string(),
            ],
        };

        FinalApprovalResponse {
            approved,
            approved_amount,
            next_steps,
            rejection_reasons: (!approved).then_some(findings.reasons),
            document_status: findings.status,
        }
    }
}
