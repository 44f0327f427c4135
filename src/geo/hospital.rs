//! Cached hospital location lookup

use std::sync::Arc;
use std::time::Duration;

use super::{Coordinates, Geocoder};
use crate::error::{ApiError, ApiResult};
use crate::store::KeyValueStore;

/// Resolves hospital place ids to coordinates through a day-long cache
#[derive(Clone)]
pub struct HospitalLocator {
    geocoder: Arc<dyn Geocoder>,
    cache: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl HospitalLocator {
    pub fn new(geocoder: Arc<dyn Geocoder>, cache: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self {
            geocoder,
            cache,
            ttl,
        }
    }

    fn cache_key(place_id: &str) -> String {
        format!("hospital:{}", place_id)
    }

    /// Cache read failures and undecodable entries fall through to the geocoder
    pub async fn resolve_hospital_location(&self, place_id: &str) -> ApiResult<Coordinates> {
        let key = Self::cache_key(place_id);

        match self.cache.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Coordinates>(&raw) {
                Ok(coords) => {
                    tracing::debug!(place_id, "Hospital location cache hit");
                    return Ok(coords);
                }
                Err(e) => tracing::warn!(place_id, error = %e, "Discarding corrupt cache entry"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(place_id, error = %e, "Hospital cache unavailable"),
        }

        let coords = self
            .geocoder
            .place_location(place_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("hospital not found: {}", place_id)))?;

        match serde_json::to_string(&coords) {
            Ok(raw) => {
                if let Err(e) = self.cache.set(&key, &raw, Some(self.ttl)).await {
                    tracing::warn!(place_id, error = %e, "Failed to cache hospital location");
                }
            }
            Err(e) => tracing::warn!(place_id, error = %e, "Failed to encode hospital location"),
        }

        Ok(coords)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoError;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingGeocoder {
        calls: AtomicUsize,
        result: Result<Option<Coordinates>, ()>,
    }

    #[async_trait]
    impl Geocoder for CountingGeocoder {
        async fn place_location(&self, _place_id: &str) -> Result<Option<Coordinates>, GeoError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
                .map_err(|_| GeoError::Transport("connection refused".to_string()))
        }
    }

    fn locator(result: Result<Option<Coordinates>, ()>) -> (HospitalLocator, Arc<CountingGeocoder>) {
        let geocoder = Arc::new(CountingGeocoder {
            calls: AtomicUsize::new(0),
            result,
        });
        let locator = HospitalLocator::new(
            geocoder.clone(),
            Arc::new(InMemoryStore::new()),
            Duration::from_secs(60),
        );
        (locator, geocoder)
    }

    #[tokio::test]
    async fn test_second_lookup_is_served_from_cache() {
        let (locator, geocoder) = locator(Ok(Some(Coordinates::new(19.0, 72.8))));

        let first = locator.resolve_hospital_location("ChIJ-a").await.unwrap();
        let second = locator.resolve_hospital_location("ChIJ-a").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_place_is_not_found() {
        let (locator, _) = locator(Ok(None));
        let err = locator.resolve_hospital_location("ChIJ-x").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_geocoder_outage_is_dependency_unavailable() {
        let (locator, _) = locator(Err(()));
        let err = locator.resolve_hospital_location("ChIJ-x").await.unwrap_err();
        assert!(matches!(err, ApiError::DependencyUnavailable(_)));
    }
}
