//! HTTP clients for the places and IP geolocation services

use async_trait::async_trait;
use serde::Deserialize;

use super::{Coordinates, GeoError, Geocoder, IpGeolocator};

const PLACES_DETAILS_URL: &str = "https://maps.googleapis.com/maps/api/place/details/json";

/// Google Places details lookup
#[derive(Clone)]
pub struct GooglePlacesGeocoder {
    http: reqwest::Client,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaceDetailsResponse {
    status: String,
    #[serde(default)]
    result: Option<PlaceDetails>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaceDetails {
    geometry: PlaceGeometry,
}

#[derive(Debug, Deserialize)]
struct PlaceGeometry {
    location: Coordinates,
}

impl GooglePlacesGeocoder {
    pub fn new(http: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            http,
            api_key,
        }
    }
}

#[async_trait]
impl Geocoder for GooglePlacesGeocoder {
    async fn place_location(&self, place_id: &str) -> Result<Option<Coordinates>, GeoError> {
        let api_key = self.api_key.as_deref().ok_or(GeoError::NotConfigured)?;

        let body: PlaceDetailsResponse = self
            .http
            .get(PLACES_DETAILS_URL)
            .query(&[
                ("place_id", place_id),
                ("fields", "geometry"),
                ("key", api_key),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match body.status.as_str() {
            "OK" => Ok(body
                .result
                .map(|details| details.geometry.location)
                .filter(Coordinates::is_valid)),
            "NOT_FOUND" | "ZERO_RESULTS" | "INVALID_REQUEST" => Ok(None),
            other => Err(GeoError::Rejected(format!(
                "{}{}",
                other,
                body.error_message
                    .map(|m| format!(": {}", m))
                    .unwrap_or_default()
            ))),
        }
    }
}

/// ipapi-style `/<ip>/json` lookup
#[derive(Clone)]
pub struct IpApiGeolocator {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default)]
    error: bool,
}

impl IpApiGeolocator {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl IpGeolocator for IpApiGeolocator {
    async fn locate(&self, ip: &str) -> Result<Option<Coordinates>, GeoError> {
        let url = format!("{}/{}/json", self.base_url.trim_end_matches('/'), ip);
        let body: IpApiResponse = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if body.error {
            return Ok(None);
        }

        Ok(match (body.latitude, body.longitude) {
            (Some(lat), Some(lng)) => Some(Coordinates::new(lat, lng)).filter(Coordinates::is_valid),
            _ => None,
        })
    }
}
