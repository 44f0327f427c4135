//! Document verification and fraud checks for final approval

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use super::severity::SeverityTier;
use crate::store::StoreError;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Extracted dates further than this from the incident are inconsistent
pub const DATE_TOLERANCE_HOURS: i64 = 48;

/// Highest severity tier (lowest urgency) that can still be approved
pub const MAX_APPROVABLE_TIER: SeverityTier = SeverityTier::SERIOUS;

// ============================================================================
// Data Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    #[serde(rename = "FIR")]
    Fir,
    #[serde(rename = "MEDICAL_REPORT")]
    MedicalReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Valid,
    Invalid,
    Missing,
}

/// Per-document outcome reported back to the applicant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStatusMap {
    #[serde(rename = "FIR")]
    pub fir: DocumentStatus,
    #[serde(rename = "MEDICAL_REPORT")]
    pub medical_report: DocumentStatus,
}

impl Default for DocumentStatusMap {
    fn default() -> Self {
        Self {
            fir: DocumentStatus::Missing,
            medical_report: DocumentStatus::Missing,
        }
    }
}

impl DocumentStatusMap {
    pub fn set(&mut self, doc_type: DocumentType, status: DocumentStatus) {
        match doc_type {
            DocumentType::Fir => self.fir = status,
            DocumentType::MedicalReport => self.medical_report = status,
        }
    }
}

// ============================================================================
// Known document hashes
// ============================================================================

/// Integrity hashes of documents that went through the upload pipeline
#[async_trait]
pub trait KnownHashStore: Send + Sync {
    async fn contains(&self, hash: &str) -> Result<bool, StoreError>;

    /// `true` when the hash was not known before
    async fn register(&self, hash: &str) -> Result<bool, StoreError>;
}

#[derive(Clone, Default)]
pub struct InMemoryKnownHashStore {
    hashes: Arc<RwLock<HashSet<String>>>,
}

impl InMemoryKnownHashStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KnownHashStore for InMemoryKnownHashStore {
    async fn contains(&self, hash: &str) -> Result<bool, StoreError> {
        Ok(self.hashes.read().await.contains(&hash.to_ascii_lowercase()))
    }

    async fn register(&self, hash: &str) -> Result<bool, StoreError> {
        Ok(self.hashes.write().await.insert(hash.to_ascii_lowercase()))
    }
}

#[derive(Clone)]
pub struct PgKnownHashStore {
    db_pool: PgPool,
}

impl PgKnownHashStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl KnownHashStore for PgKnownHashStore {
    async fn contains(&self, hash: &str) -> Result<bool, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT hash FROM document_hashes WHERE hash = $1")
                .bind(hash.to_ascii_lowercase())
                .fetch_optional(&self.db_pool)
                .await?;
        Ok(row.is_some())
    }

    async fn register(&self, hash: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO document_hashes (hash) VALUES ($1) ON CONFLICT (hash) DO NOTHING",
        )
        .bind(hash.to_ascii_lowercase())
        .execute(&self.db_pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

// ============================================================================
// Police registry
// ============================================================================

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("FIR registry request failed: {0}")]
    Transport(String),

    #[error("FIR registry rejected the query: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        RegistryError::Transport(err.to_string())
    }
}

/// External confirmation that an FIR number was actually registered
#[async_trait]
pub trait FirRegistry: Send + Sync {
    async fn verify(&self, fir_number: &str) -> Result<bool, RegistryError>;
}

/// Registry lookup over HTTP: `GET {base}/firs?number=...` returning
/// `{"registered": bool}`; 404 means not registered
#[derive(Clone)]
pub struct HttpFirRegistry {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct RegistryLookup {
    registered: bool,
}

impl HttpFirRegistry {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl FirRegistry for HttpFirRegistry {
    async fn verify(&self, fir_number: &str) -> Result<bool, RegistryError> {
        let response = self
            .http
            .get(format!("{}/firs", self.base_url))
            .query(&[("number", fir_number)])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !response.status().is_success() {
            return Err(RegistryError::Rejected(response.status().to_string()));
        }

        let lookup: RegistryLookup = response.json().await?;
        Ok(lookup.registered)
    }
}

/// Development stand-in used when no registry is configured; accepts every
/// structurally valid FIR number
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineFirRegistry;

#[async_trait]
impl FirRegistry for OfflineFirRegistry {
    async fn verify(&self, fir_number: &str) -> Result<bool, RegistryError> {
        tracing::warn!(fir_number, "FIR registry not configured, accepting FIR unverified");
        Ok(true)
    }
}

// ============================================================================
// Cross-document checks and decision
// ============================================================================

/// `true` if any date is more than 48 hours from the incident.
///
/// Document dates carry no time of day and are taken as midnight UTC.
pub fn dates_inconsistent(dates: &[NaiveDate], incident_at: DateTime<Utc>) -> bool {
    dates.iter().any(|date| {
        date.and_hms_opt(0, 0, 0)
            .map(|midnight| Utc.from_utc_datetime(&midnight))
            .map(|at| (at - incident_at).num_hours().abs() > DATE_TOLERANCE_HOURS)
            .unwrap_or(true)
    })
}

/// Final approval decision
pub struct FinalApprovalPolicy;

impl FinalApprovalPolicy {
    /// Every clause must hold; any single failure rejects
    pub fn is_approved(
        fir_valid: bool,
        medical_valid: bool,
        dates_inconsistent: bool,
        severity_tier: SeverityTier,
        reasons: &[String],
    ) -> bool {
        fir_valid
            && medical_valid
            && !dates_inconsistent
            && severity_tier <= MAX_APPROVABLE_TIER
            && reasons.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn incident() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 12, 15, 0, 0).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_all_clauses_satisfied_approves() {
        assert!(FinalApprovalPolicy::is_approved(
            true,
            true,
            false,
            SeverityTier::SERIOUS,
            &[]
        ));
    }

    #[test]
    fn test_each_clause_rejects_in_isolation() {
        let ok_tier = SeverityTier::CRITICAL;
        let reason = vec!["Document hash not recognised".to_string()];

        assert!(!FinalApprovalPolicy::is_approved(false, true, false, ok_tier, &[]));
        assert!(!FinalApprovalPolicy::is_approved(true, false, false, ok_tier, &[]));
        assert!(!FinalApprovalPolicy::is_approved(true, true, true, ok_tier, &[]));
        assert!(!FinalApprovalPolicy::is_approved(
            true,
            true,
            false,
            SeverityTier::MODERATE,
            &[]
        ));
        assert!(!FinalApprovalPolicy::is_approved(true, true, false, ok_tier, &reason));
    }

    #[test]
    fn test_dates_within_tolerance() {
        assert!(!dates_inconsistent(&[day(12), day(13), day(14)], incident()));
        assert!(!dates_inconsistent(&[], incident()));
    }

    #[test]
    fn test_dates_outside_tolerance() {
        // Midnight on the 10th is 63 hours before the incident.
        assert!(dates_inconsistent(&[day(12), day(10)], incident()));
        assert!(dates_inconsistent(&[day(16)], incident()));
    }

    #[test]
    fn test_tolerance_boundary() {
        let at_midnight = Utc.with_ymd_and_hms(2024, 3, 12, 0, 0, 0).unwrap();
        assert!(!dates_inconsistent(&[day(14)], at_midnight));
        assert!(dates_inconsistent(
            &[day(14)],
            at_midnight - Duration::hours(1)
        ));
    }

    #[test]
    fn test_status_map_wire_format() {
        let mut map = DocumentStatusMap::default();
        map.set(DocumentType::Fir, DocumentStatus::Invalid);
        assert_eq!(
            serde_json::to_value(map).unwrap(),
            serde_json::json!({ "FIR": "INVALID", "MEDICAL_REPORT": "MISSING" })
        );
    }

    #[tokio::test]
    async fn test_known_hashes_are_case_insensitive() {
        let store = InMemoryKnownHashStore::new();
        let hash = "AB".repeat(32);
        assert!(store.register(&hash).await.unwrap());
        assert!(!store.register(&hash.to_lowercase()).await.unwrap());
        assert!(store.contains(&"ab".repeat(32)).await.unwrap());
        assert!(!store.contains(&"cd".repeat(32)).await.unwrap());
    }
}
