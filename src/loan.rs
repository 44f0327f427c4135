//! Loan models and persistence

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::ApiError;
use crate::store::StoreError;

static LOAN_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^loan-\d{13}-\d{4}$").expect("valid loan id pattern"));

/// `loan-<epoch millis>-<4 digits>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoanId(String);

impl LoanId {
    pub fn generate() -> Self {
        let suffix: u16 = rand::thread_rng().gen_range(0..10_000);
        Self(format!("loan-{:013}-{:04}", Utc::now().timestamp_millis(), suffix))
    }

    pub fn parse(raw: &str) -> Result<Self, ApiError> {
        let raw = raw.trim();
        if LOAN_ID.is_match(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(ApiError::ValidationError(format!("malformed loan id: {}", raw)))
        }
    }

    pub fn is_well_formed(raw: &str) -> bool {
        LOAN_ID.is_match(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LoanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Loan lifecycle status
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    Pending,
    Confirmed,
    PendingApproval,
    Approved,
    Rejected,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Pending => "PENDING",
            LoanStatus::Confirmed => "CONFIRMED",
            LoanStatus::PendingApproval => "PENDING_APPROVAL",
            LoanStatus::Approved => "APPROVED",
            LoanStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "PENDING" => Ok(LoanStatus::Pending),
            "CONFIRMED" => Ok(LoanStatus::Confirmed),
            "PENDING_APPROVAL" => Ok(LoanStatus::PendingApproval),
            "APPROVED" => Ok(LoanStatus::Approved),
            "REJECTED" => Ok(LoanStatus::Rejected),
            other => Err(StoreError::Corrupt(format!("loan status {}", other))),
        }
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loan model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanRecord {
    pub id: LoanId,
    #[serde(skip_serializing)]
    pub identity_hash: String,
    pub requested_amount: u64,
    pub description: String,
    pub hospital_place_id: String,
    /// Reference date for document date consistency checks
    pub incident_at: DateTime<Utc>,
    pub risk_score: Option<u8>,
    pub status: LoanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct LoanRow {
    id: String,
    identity_hash: String,
    requested_amount: i64,
    description: String,
    hospital_place_id: String,
    incident_at: DateTime<Utc>,
    risk_score: Option<i16>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<LoanRow> for LoanRecord {
    type Error = StoreError;

    fn try_from(row: LoanRow) -> Result<Self, Self::Error> {
        Ok(LoanRecord {
            id: LoanId(row.id),
            identity_hash: row.identity_hash,
            requested_amount: u64::try_from(row.requested_amount)
                .map_err(|_| StoreError::Corrupt("negative requested amount".to_string()))?,
            description: row.description,
            hospital_place_id: row.hospital_place_id,
            incident_at: row.incident_at,
            risk_score: row
                .risk_score
                .map(|s| u8::try_from(s).map_err(|_| StoreError::Corrupt("risk score".to_string())))
                .transpose()?,
            status: LoanStatus::parse(&row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Loan persistence seam
#[async_trait]
pub trait LoanRepository: Send + Sync {
    /// Store a new loan; `false` when the id is already taken
    async fn insert(&self, loan: &LoanRecord) -> Result<bool, StoreError>;

    async fn get(&self, id: &LoanId) -> Result<Option<LoanRecord>, StoreError>;

    /// Compare-and-set status change; `false` when the loan was not in `from`
    async fn transition(
        &self,
        id: &LoanId,
        from: LoanStatus,
        to: LoanStatus,
    ) -> Result<bool, StoreError>;
}

/// Process-local repository for development and tests
#[derive(Clone, Default)]
pub struct InMemoryLoanRepository {
    loans: Arc<RwLock<HashMap<LoanId, LoanRecord>>>,
}

impl InMemoryLoanRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LoanRepository for InMemoryLoanRepository {
    async fn insert(&self, loan: &LoanRecord) -> Result<bool, StoreError> {
        let mut loans = self.loans.write().await;
        if loans.contains_key(&loan.id) {
            return Ok(false);
        }
        loans.insert(loan.id.clone(), loan.clone());
        Ok(true)
    }

    async fn get(&self, id: &LoanId) -> Result<Option<LoanRecord>, StoreError> {
        Ok(self.loans.read().await.get(id).cloned())
    }

    async fn transition(
        &self,
        id: &LoanId,
        from: LoanStatus,
        to: LoanStatus,
    ) -> Result<bool, StoreError> {
        let mut loans = self.loans.write().await;
        match loans.get_mut(id) {
            Some(loan) if loan.status == from => {
                loan.status = to;
                loan.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Postgres repository
#[derive(Clone)]
pub struct PgLoanRepository {
    db_pool: PgPool,
}

impl PgLoanRepository {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl LoanRepository for PgLoanRepository {
    async fn insert(&self, loan: &LoanRecord) -> Result<bool, StoreError> {
        let amount = i64::try_from(loan.requested_amount)
            .map_err(|_| StoreError::Backend("requested amount out of range".to_string()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO loans (
                id, identity_hash, requested_amount, description,
                hospital_place_id, incident_at, risk_score, status,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(loan.id.as_str())
        .bind(&loan.identity_hash)
        .bind(amount)
        .bind(&loan.description)
        .bind(&loan.hospital_place_id)
        .bind(loan.incident_at)
        .bind(loan.risk_score.map(i16::from))
        .bind(loan.status.as_str())
        .bind(loan.created_at)
        .bind(loan.updated_at)
        .execute(&self.db_pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get(&self, id: &LoanId) -> Result<Option<LoanRecord>, StoreError> {
        let row = sqlx::query_as::<_, LoanRow>("SELECT * FROM loans WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.db_pool)
            .await?;

        row.map(LoanRecord::try_from).transpose()
    }

    async fn transition(
        &self,
        id: &LoanId,
        from: LoanStatus,
        to: LoanStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE loans SET status = $1, updated_at = $2 WHERE id = $3 AND status = $4",
        )
        .bind(to.as_str())
        .bind(Utc::now())
        .bind(id.as_str())
        .bind(from.as_str())
        .execute(&self.db_pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
