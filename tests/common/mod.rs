//! Shared fakes and fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use medloan_server::audit::hash_identity;
use medloan_server::config::Config;
use medloan_server::geo::{Coordinates, GeoError, Geocoder, IpGeolocator};
use medloan_server::loan::{
    InMemoryLoanRepository, LoanId, LoanRecord, LoanRepository, LoanStatus,
};
use medloan_server::services::documents::{FirRegistry, RegistryError};
use medloan_server::services::image::HeuristicImageAnalyzer;
use medloan_server::state::{AppState, Backends, Collaborators};
use medloan_server::store::StoreError;

pub const AADHAAR: &str = "123456789012";
pub const HOSPITAL: &str = "ChIJ-city-hospital";
pub const FAR_HOSPITAL: &str = "ChIJ-far-hospital";
pub const REGISTERED_FIR: &str = "123/2024";

/// Kilometres per degree of latitude on a 6371 km sphere
pub const KM_PER_DEGREE: f64 = 111.194_926_644_558_73;

pub const APPLICANT: Coordinates = Coordinates {
    lat: 19.0760,
    lng: 72.8777,
};

pub fn point_north_of(origin: Coordinates, km: f64) -> Coordinates {
    Coordinates::new(origin.lat + km / KM_PER_DEGREE, origin.lng)
}

pub struct FixedGeocoder {
    places: HashMap<String, Coordinates>,
}

impl FixedGeocoder {
    pub fn standard() -> Self {
        let mut places = HashMap::new();
        places.insert(HOSPITAL.to_string(), point_north_of(APPLICANT, 10.0));
        places.insert(FAR_HOSPITAL.to_string(), point_north_of(APPLICANT, 150.0));
        Self { places }
    }
}

#[async_trait]
impl Geocoder for FixedGeocoder {
    async fn place_location(&self, place_id: &str) -> Result<Option<Coordinates>, GeoError> {
        Ok(self.places.get(place_id).copied())
    }
}

pub struct NoIpLookup;

#[async_trait]
impl IpGeolocator for NoIpLookup {
    async fn locate(&self, _ip: &str) -> Result<Option<Coordinates>, GeoError> {
        Ok(None)
    }
}

/// Registry that knows a fixed set of FIR numbers
pub struct StaticRegistry {
    registered: HashSet<String>,
}

impl StaticRegistry {
    pub fn standard() -> Self {
        Self {
            registered: [REGISTERED_FIR.to_string()].into_iter().collect(),
        }
    }
}

#[async_trait]
impl FirRegistry for StaticRegistry {
    async fn verify(&self, fir_number: &str) -> Result<bool, RegistryError> {
        Ok(self.registered.contains(fir_number))
    }
}

/// Registry that answers after a fixed delay
pub struct SlowRegistry {
    pub delay: Duration,
}

#[async_trait]
impl FirRegistry for SlowRegistry {
    async fn verify(&self, fir_number: &str) -> Result<bool, RegistryError> {
        tokio::time::sleep(self.delay).await;
        StaticRegistry::standard().verify(fir_number).await
    }
}

/// Repository whose status changes commit and then stall before returning
#[derive(Clone, Default)]
pub struct SlowTransitionRepository {
    pub inner: InMemoryLoanRepository,
    pub stall: Duration,
}

#[async_trait]
impl LoanRepository for SlowTransitionRepository {
    async fn insert(&self, loan: &LoanRecord) -> Result<bool, StoreError> {
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
        let moved = self.inner.transition(id, from, to).await?;
        tokio::time::sleep(self.stall).await;
        Ok(moved)
    }
}

pub fn test_config() -> Config {
    Config::default()
}

pub fn collaborators() -> Collaborators {
    Collaborators {
        geocoder: Arc::new(FixedGeocoder::standard()),
        ip_geolocator: Some(Arc::new(NoIpLookup)),
        image_analyzer: Arc::new(HeuristicImageAnalyzer),
        fir_registry: Arc::new(StaticRegistry::standard()),
    }
}

/// App state over in-memory backends; the backends are returned for seeding
pub fn test_state() -> (AppState, Backends) {
    let backends = Backends::in_memory();
    let state = AppState::new(&test_config(), backends.clone(), collaborators());
    (state, backends)
}

pub fn incident_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 12, 10, 0, 0).unwrap()
}

/// Insert a loan that is waiting for its documents
pub async fn seed_pending_loan(backends: &Backends) -> LoanId {
    let now = Utc::now();
    let loan = LoanRecord {
        id: LoanId::generate(),
        identity_hash: hash_identity(AADHAAR, &test_config().identity_hash_salt),
        requested_amount: 100_000,
        description: "serious leg fracture after a road accident".to_string(),
        hospital_place_id: HOSPITAL.to_string(),
        incident_at: incident_at(),
        risk_score: Some(35),
        status: LoanStatus::PendingApproval,
        created_at: now,
        updated_at: now,
    };
    backends.loans.insert(&loan).await.unwrap();
    loan.id
}

pub const FIR_HASH: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
pub const MEDICAL_HASH: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
pub const UNKNOWN_HASH: &str = "cccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccc";

pub async fn seed_known_hashes(backends: &Backends) {
    backends.known_hashes.register(FIR_HASH).await.unwrap();
    backends.known_hashes.register(MEDICAL_HASH).await.unwrap();
}

pub const VALID_FIR: &str =
    "FIR No. 123/2024 registered at Andheri police station on 12/03/2024 after a collision on the western express highway.";

pub const FIR_WITHOUT_NUMBER: &str =
    "The applicant reported a collision on the western express highway to the police on 12/03/2024.";

pub const SERIOUS_REPORT: &str =
    "Diagnosis: compound fracture of the left femur, serious condition. Treatment: surgery on 12/03/2024. Physician: Dr. Rao, City Hospital.";

/// Three of four required terms, no severity keyword
pub const MODERATE_REPORT: &str =
    "Diagnosis: sprained wrist after a fall. Treatment: cold compress and rest on 12/03/2024. Physician: Dr. Mehta.";

pub const INCOMPLETE_REPORT: &str =
    "Diagnosis: serious fracture of the left femur. Patient admitted to City Hospital on 12/03/2024 for observation.";

pub const STALE_REPORT: &str =
    "Diagnosis: compound fracture of the left femur, serious condition. Treatment: surgery on 01/03/2024. Physician: Dr. Rao, City Hospital.";

pub fn document(doc_type: &str, text: &str, hash: &str) -> serde_json::Value {
    serde_json::json!({ "type": doc_type, "text": text, "hash": hash })
}

pub fn approval_body(loan_id: &LoanId, documents: Vec<serde_json::Value>) -> serde_json::Value {
    serde_json::json!({
        "loanId": loan_id.as_str(),
        "hospitalPlaceId": HOSPITAL,
        "documents": documents,
    })
}
