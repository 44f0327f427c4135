//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;

use crate::audit::{AttemptCounter, AuditTrail, IdempotencyCache, WindowLimiter};
use crate::config::Config;
use crate::geo::{Geocoder, HospitalLocator, IpGeolocator, UserLocator};
use crate::loan::{InMemoryLoanRepository, LoanRepository, PgLoanRepository};
use crate::loan_service::LoanService;
use crate::services::documents::{
    FirRegistry, InMemoryKnownHashStore, KnownHashStore, PgKnownHashStore,
};
use crate::services::image::ImageAnalyzer;
use crate::services::{ApprovalService, RiskService};
use crate::store::{InMemoryStore, KeyValueStore, PgStore};

const MINUTE: std::time::Duration = std::time::Duration::from_secs(60);
const HOUR: std::time::Duration = std::time::Duration::from_secs(3600);

/// Storage backends: all Postgres or all in-process
#[derive(Clone)]
pub struct Backends {
    pub name: &'static str,
    pub store: Arc<dyn KeyValueStore>,
    pub loans: Arc<dyn LoanRepository>,
    pub known_hashes: Arc<dyn KnownHashStore>,
}

impl Backends {
    pub fn in_memory() -> Self {
        Self {
            name: "memory",
            store: Arc::new(InMemoryStore::new()),
            loans: Arc::new(InMemoryLoanRepository::new()),
            known_hashes: Arc::new(InMemoryKnownHashStore::new()),
        }
    }

    pub fn postgres(db_pool: sqlx::PgPool) -> Self {
        Self {
            name: "postgres",
            store: Arc::new(PgStore::new(db_pool.clone())),
            loans: Arc::new(PgLoanRepository::new(db_pool.clone())),
            known_hashes: Arc::new(PgKnownHashStore::new(db_pool)),
        }
    }
}

/// External services the pipelines call out to
#[derive(Clone)]
pub struct Collaborators {
    pub geocoder: Arc<dyn Geocoder>,
    pub ip_geolocator: Option<Arc<dyn IpGeolocator>>,
    pub image_analyzer: Arc<dyn ImageAnalyzer>,
    pub fir_registry: Arc<dyn FirRegistry>,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub risk_service: Arc<RiskService>,
    pub approval_service: Arc<ApprovalService>,
    pub loan_service: Arc<LoanService>,
    pub known_hashes: Arc<dyn KnownHashStore>,
    pub store: Arc<dyn KeyValueStore>,
    pub backend: &'static str,
    pub ip_limiter: WindowLimiter,
}

impl AppState {
    /// Wire every service from configuration
    pub fn new(config: &Config, backends: Backends, collaborators: Collaborators) -> Self {
        let Backends {
            name,
            store,
            loans,
            known_hashes,
        } = backends;

        let audit = AuditTrail::new(store.clone());
        let hospitals = HospitalLocator::new(
            collaborators.geocoder,
            store.clone(),
            config.hospital_cache_ttl,
        );

        let risk_service = RiskService::new(
            hospitals.clone(),
            UserLocator::new(collaborators.ip_geolocator, config.fallback_location),
            collaborators.image_analyzer,
            loans.clone(),
            WindowLimiter::new(
                store.clone(),
                "identity",
                config.identity_rate_limit_per_hour,
                HOUR,
            ),
            audit.clone(),
            config.identity_hash_salt.clone(),
            config.request_timeout,
            config.image_analysis_timeout,
        );

        let approval_service = ApprovalService::new(
            loans.clone(),
            known_hashes.clone(),
            collaborators.fir_registry,
            hospitals,
            WindowLimiter::new(
                store.clone(),
                "approval",
                config.approval_attempts_per_hour,
                HOUR,
            ),
            IdempotencyCache::new(store.clone(), config.idempotency_ttl),
            audit.clone(),
            config.request_timeout,
        );

        let loan_service = LoanService::new(
            loans,
            AttemptCounter::new(store.clone(), "confirm", config.confirmation_attempt_cap),
            audit,
            config.identity_hash_salt.clone(),
        );

        Self {
            risk_service: Arc::new(risk_service),
            approval_service: Arc::new(approval_service),
            loan_service: Arc::new(loan_service),
            known_hashes,
            ip_limiter: WindowLimiter::new(
                store.clone(),
                "ip",
                config.ip_rate_limit_per_minute,
                MINUTE,
            ),
            store,
            backend: name,
        }
    }
}

impl FromRef<AppState> for Arc<RiskService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.risk_service.clone()
    }
}

impl FromRef<AppState> for Arc<ApprovalService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.approval_service.clone()
    }
}

impl FromRef<AppState> for Arc<LoanService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.loan_service.clone()
    }
}

impl FromRef<AppState> for Arc<dyn KnownHashStore> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.known_hashes.clone()
    }
}
