//! Applicant location priority chain

use axum::http::HeaderMap;
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;

use super::{Coordinates, IpGeolocator};
use crate::middleware::client_ip;

const EDGE_LAT_HEADER: &str = "x-vercel-ip-latitude";
const EDGE_LNG_HEADER: &str = "x-vercel-ip-longitude";

/// Where a resolved applicant location came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    Client,
    EdgeHeaders,
    IpLookup,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolvedLocation {
    pub coordinates: Coordinates,
    pub source: LocationSource,
}

/// Explicit coordinates, then edge headers, then IP lookup, then fallback
#[derive(Clone)]
pub struct UserLocator {
    ip_geolocator: Option<Arc<dyn IpGeolocator>>,
    fallback: Coordinates,
}

impl UserLocator {
    pub fn new(ip_geolocator: Option<Arc<dyn IpGeolocator>>, fallback: Coordinates) -> Self {
        Self {
            ip_geolocator,
            fallback,
        }
    }

    pub async fn resolve_user_location(
        &self,
        explicit: Option<Coordinates>,
        headers: &HeaderMap,
    ) -> ResolvedLocation {
        if let Some(coords) = explicit.filter(Coordinates::is_valid) {
            return ResolvedLocation {
                coordinates: coords,
                source: LocationSource::Client,
            };
        }

        if let Some(coords) = edge_header_location(headers) {
            return ResolvedLocation {
                coordinates: coords,
                source: LocationSource::EdgeHeaders,
            };
        }

        if let (Some(geolocator), Some(ip)) = (&self.ip_geolocator, client_ip(headers)) {
            if is_routable(&ip) {
                match geolocator.locate(&ip).await {
                    Ok(Some(coords)) => {
                        return ResolvedLocation {
                            coordinates: coords,
                            source: LocationSource::IpLookup,
                        }
                    }
                    Ok(None) => tracing::debug!(client = %ip, "No IP geolocation result"),
                    Err(e) => tracing::warn!(client = %ip, error = %e, "IP geolocation failed"),
                }
            }
        }

        ResolvedLocation {
            coordinates: self.fallback,
            source: LocationSource::Fallback,
        }
    }
}

fn edge_header_location(headers: &HeaderMap) -> Option<Coordinates> {
    let read = |name: &str| -> Option<f64> {
        headers
            .get(name)?
            .to_str()
            .ok()?
            .trim()
            .parse::<f64>()
            .ok()
    };

    let coords = Coordinates::new(read(EDGE_LAT_HEADER)?, read(EDGE_LNG_HEADER)?);
    coords.is_valid().then_some(coords)
}

fn is_routable(ip: &str) -> bool {
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => !(v4.is_loopback() || v4.is_private() || v4.is_unspecified()),
        Ok(IpAddr::V6(v6)) => !(v6.is_loopback() || v6.is_unspecified()),
        Err(_) => false,
    }
}
