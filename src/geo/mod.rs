//! Geolocation resolution
//!
//! Hospital coordinates come from the places service (cached for a day);
//! applicant coordinates come from a priority chain that always yields a
//! value so the risk pipeline never blocks on a missing location.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ApiError;

mod clients;
mod hospital;
mod user;

pub use clients::{GooglePlacesGeocoder, IpApiGeolocator};
pub use hospital::HospitalLocator;
pub use user::{LocationSource, ResolvedLocation, UserLocator};

/// Mean Earth radius used by the haversine formula
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 coordinate pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Great-circle distance between two coordinates, in kilometers
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Errors from geocoding collaborators
#[derive(Error, Debug)]
pub enum GeoError {
    #[error("geocoding service is not configured")]
    NotConfigured,

    #[error("geocoding request failed: {0}")]
    Transport(String),

    #[error("geocoding service rejected the request: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for GeoError {
    fn from(err: reqwest::Error) -> Self {
        GeoError::Transport(err.to_string())
    }
}

impl From<GeoError> for ApiError {
    fn from(err: GeoError) -> Self {
        ApiError::DependencyUnavailable(err.to_string())
    }
}

/// Place identifier to coordinates
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` means the place does not exist
    async fn place_location(&self, place_id: &str) -> Result<Option<Coordinates>, GeoError>;
}

/// IP address to approximate coordinates
#[async_trait]
pub trait IpGeolocator: Send + Sync {
    async fn locate(&self, ip: &str) -> Result<Option<Coordinates>, GeoError>;
}
