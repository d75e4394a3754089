//! Geocoder: resolves a place name to coordinates via an external HTTP
//! gazetteer (Nominatim-shaped), with an in-process cache and a hardcoded
//! bilingual major-city radius table.

use crate::query_plan::Coords;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

const MAJOR_CITY_RADIUS_KM: f64 = 20.0;
const DEFAULT_RADIUS_KM: f64 = 5.0;
const TIMEOUT: Duration = Duration::from_secs(3);

/// Bilingual aliases for cities that get the wider match radius.
const MAJOR_CITIES: &[&str] = &[
    "뉴욕", "new york", "서울", "seoul", "파리", "paris", "도쿄", "tokyo", "라스베가스", "las vegas",
    "런던", "london", "로스앤젤레스", "los angeles", "부산", "busan",
];

#[derive(Deserialize)]
struct NominatimHit {
    lat: String,
    lon: String,
}

/// HTTP-backed named-place resolver. Caches by the exact input string and
/// never raises: a failed or timed-out lookup resolves to `None`.
pub struct Geocoder {
    endpoint: String,
    client: reqwest::blocking::Client,
    cache: Mutex<HashMap<String, Option<Coords>>>,
}

impl Geocoder {
    pub fn new(endpoint: &str) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(TIMEOUT)
            .build()
            .expect("reqwest client builds with static configuration");
        Geocoder {
            endpoint: endpoint.to_string(),
            client,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve `name` to coordinates, or `None` on any failure or miss.
    pub fn resolve(&self, name: &str) -> Option<Coords> {
        if let Some(cached) = self.cache.lock().unwrap().get(name) {
            return *cached;
        }

        let result = self.lookup(name);
        self.cache.lock().unwrap().insert(name.to_string(), result);
        result
    }

    fn lookup(&self, name: &str) -> Option<Coords> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", name), ("format", "json"), ("limit", "1")])
            .send();

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!(name, error = %e, "geocoder request failed");
                return None;
            }
        };

        let hits: Vec<NominatimHit> = match response.json() {
            Ok(h) => h,
            Err(e) => {
                warn!(name, error = %e, "geocoder returned unparsable response");
                return None;
            }
        };

        let hit = hits.into_iter().next()?;
        let lat: f64 = hit.lat.parse().ok()?;
        let lon: f64 = hit.lon.parse().ok()?;

        Some(Coords {
            lat,
            lon,
            radius_km: radius_for(name),
        })
    }
}

fn radius_for(name: &str) -> f64 {
    let lower = name.to_lowercase();
    if MAJOR_CITIES.iter().any(|city| lower.contains(city)) {
        MAJOR_CITY_RADIUS_KM
    } else {
        DEFAULT_RADIUS_KM
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::MockServer;

    #[test]
    fn test_radius_major_city_bilingual() {
        assert_eq!(radius_for("Seoul"), MAJOR_CITY_RADIUS_KM);
        assert_eq!(radius_for("서울"), MAJOR_CITY_RADIUS_KM);
        assert_eq!(radius_for("NEW YORK"), MAJOR_CITY_RADIUS_KM);
    }

    #[test]
    fn test_radius_other_place() {
        assert_eq!(radius_for("Gwangalli"), DEFAULT_RADIUS_KM);
    }

    #[test]
    fn test_radius_major_city_substring_match() {
        assert_eq!(radius_for("Greater Seoul"), MAJOR_CITY_RADIUS_KM);
        assert_eq!(radius_for("Seoul, South Korea"), MAJOR_CITY_RADIUS_KM);
    }

    #[test]
    fn test_resolve_success_and_cache() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/search");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"[{"lat": "37.5665", "lon": "126.9780"}]"#);
        });

        let geocoder = Geocoder::new(&server.url("/search"));
        let coords = geocoder.resolve("서울").unwrap();
        assert!((coords.lat - 37.5665).abs() < 1e-6);
        assert_eq!(coords.radius_km, MAJOR_CITY_RADIUS_KM);

        // Second call hits the cache, not the mock server again.
        let _ = geocoder.resolve("서울");
        mock.assert_hits(1);
    }

    #[test]
    fn test_resolve_empty_result_is_none() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/search");
            then.status(200)
                .header("content-type", "application/json")
                .body("[]");
        });

        let geocoder = Geocoder::new(&server.url("/search"));
        assert!(geocoder.resolve("nowhere in particular").is_none());
    }

    #[test]
    fn test_resolve_upstream_error_is_none() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/search");
            then.status(500);
        });

        let geocoder = Geocoder::new(&server.url("/search"));
        assert!(geocoder.resolve("anything").is_none());
    }
}
