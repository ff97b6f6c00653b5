//! Address geocoding
//!
//! Free-text profile locations are resolved through an address-search
//! provider. Each provider has its own "no match" rule:
//!
//! | Provider | No match | Coordinates |
//! |----------|----------|-------------|
//! | Nominatim | empty result array | `[0].lat`, `[0].lon` (decimal strings) |
//! | Google Maps | `status != "OK"` | `results[0].geometry.location.{lat,lng}` |
//!
//! A no-match is a valid [`Position::Unlocatable`] result. Transport errors,
//! error statuses, and unreadable payloads are [`GeocodeError`]s, which the
//! enrichment stage also turns into the sentinel.

use crate::config::{GeocoderConfig, GeocoderProvider};
use crate::Position;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum GeocodeError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("provider returned status {0}")]
    Status(u16),
    #[error("provider refused the query: {0}")]
    Refused(String),
    #[error("unreadable response: {0}")]
    Parse(String),
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, query: &str) -> Result<Position, GeocodeError>;
}

/// Validate latitude is in valid range
fn is_valid_latitude(lat: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && lat.is_finite()
}

/// Validate longitude is in valid range
fn is_valid_longitude(lon: f64) -> bool {
    (-180.0..=180.0).contains(&lon) && lon.is_finite()
}

/// Numeric field that may arrive as a JSON number or a decimal string
fn degrees(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn located(lat: Option<f64>, lon: Option<f64>) -> Result<Position, GeocodeError> {
    match (lat, lon) {
        (Some(lat), Some(lon)) if is_valid_latitude(lat) && is_valid_longitude(lon) => {
            Ok(Position::Located { lat, lon })
        }
        (Some(lat), Some(lon)) => Err(GeocodeError::Parse(format!(
            "coordinates out of range: {}, {}",
            lat, lon
        ))),
        _ => Err(GeocodeError::Parse("result without coordinates".to_string())),
    }
}

/// Interpret a Nominatim `/search` response
pub fn parse_nominatim(payload: &Value) -> Result<Position, GeocodeError> {
    let results = payload
        .as_array()
        .ok_or_else(|| GeocodeError::Parse("expected a result list".to_string()))?;

    match results.first() {
        None => Ok(Position::Unlocatable),
        Some(best) => located(degrees(best.get("lat")), degrees(best.get("lon"))),
    }
}

/// Interpret a Google Geocoding API response
pub fn parse_google(payload: &Value) -> Result<Position, GeocodeError> {
    let status = payload
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| GeocodeError::Parse("missing status".to_string()))?;

    match status {
        "OK" => {}
        "ZERO_RESULTS" | "INVALID_REQUEST" => return Ok(Position::Unlocatable),
        other => {
            // OVER_QUERY_LIMIT, REQUEST_DENIED, UNKNOWN_ERROR
            let message = payload
                .get("error_message")
                .and_then(Value::as_str)
                .map(|m| format!("{}: {}", other, m))
                .unwrap_or_else(|| other.to_string());
            return Err(GeocodeError::Refused(message));
        }
    }

    let location = payload
        .get("results")
        .and_then(|r| r.get(0))
        .and_then(|r| r.get("geometry"))
        .and_then(|g| g.get("location"));

    match location {
        Some(loc) => located(degrees(loc.get("lat")), degrees(loc.get("lng"))),
        None => Ok(Position::Unlocatable),
    }
}

/// Geocoder backed by a public HTTP provider
pub struct HttpGeocoder {
    client: reqwest::Client,
    provider: GeocoderProvider,
    base_url: String,
}

impl HttpGeocoder {
    pub fn new(client: reqwest::Client, config: &GeocoderConfig) -> Self {
        Self {
            client,
            provider: config.provider.clone(),
            base_url: config.base_url().trim_end_matches('/').to_string(),
        }
    }

    async fn fetch_json(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Value, GeocodeError> {
        let response = self.client.get(url).query(query).send().await?;

        if !response.status().is_success() {
            return Err(GeocodeError::Status(response.status().as_u16()));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| GeocodeError::Parse(e.to_string()))
    }

    async fn fetch_nominatim(&self, query: &str) -> Result<Position, GeocodeError> {
        let url = format!("{}/search", self.base_url);
        let payload = self
            .fetch_json(&url, &[("q", query), ("format", "jsonv2"), ("limit", "1")])
            .await?;
        parse_nominatim(&payload)
    }

    async fn fetch_google(
        &self,
        query: &str,
        api_key: Option<&str>,
    ) -> Result<Position, GeocodeError> {
        let url = format!("{}/maps/api/geocode/json", self.base_url);
        let mut params = vec![("address", query)];
        if let Some(key) = api_key {
            params.push(("key", key));
        }
        let payload = self.fetch_json(&url, &params).await?;
        parse_google(&payload)
    }
}

#[async_trait]
impl Geocoder for HttpGeocoder {
    async fn geocode(&self, query: &str) -> Result<Position, GeocodeError> {
        debug!("Geocoding {:?}", query);
        match &self.provider {
            GeocoderProvider::Nominatim => self.fetch_nominatim(query).await,
            GeocoderProvider::GoogleMaps { api_key } => {
                self.fetch_google(query, api_key.as_deref()).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nominatim_first_result() {
        let payload = json!([
            {"place_id": 1, "lat": "37.7790262", "lon": "-122.419906", "display_name": "San Francisco"},
            {"place_id": 2, "lat": "0", "lon": "0"}
        ]);
        assert_eq!(
            parse_nominatim(&payload).unwrap(),
            Position::Located { lat: 37.7790262, lon: -122.419906 }
        );
    }

    #[test]
    fn test_nominatim_numeric_coordinates() {
        let payload = json!([{"lat": 37.0, "lon": -122.0}]);
        assert_eq!(
            parse_nominatim(&payload).unwrap(),
            Position::Located { lat: 37.0, lon: -122.0 }
        );
    }

    #[test]
    fn test_nominatim_empty_is_unlocatable() {
        assert_eq!(parse_nominatim(&json!([])).unwrap(), Position::Unlocatable);
    }

    #[test]
    fn test_nominatim_garbage_is_error() {
        assert!(parse_nominatim(&json!({"error": "Unable to geocode"})).is_err());
        assert!(parse_nominatim(&json!([{"lat": "north", "lon": "1"}])).is_err());
        assert!(parse_nominatim(&json!([{"lat": "91.5", "lon": "1"}])).is_err());
    }

    #[test]
    fn test_google_ok() {
        let payload = json!({
            "status": "OK",
            "results": [
                {"geometry": {"location": {"lat": 51.5073509, "lng": -0.1277583}}}
            ]
        });
        assert_eq!(
            parse_google(&payload).unwrap(),
            Position::Located { lat: 51.5073509, lon: -0.1277583 }
        );
    }

    #[test]
    fn test_google_no_match_statuses() {
        assert_eq!(
            parse_google(&json!({"status": "ZERO_RESULTS", "results": []})).unwrap(),
            Position::Unlocatable
        );
        assert_eq!(
            parse_google(&json!({"status": "INVALID_REQUEST"})).unwrap(),
            Position::Unlocatable
        );
    }

    #[test]
    fn test_google_refusal_is_error() {
        let err = parse_google(&json!({
            "status": "REQUEST_DENIED",
            "error_message": "You must use an API key"
        }))
        .unwrap_err();
        assert!(matches!(err, GeocodeError::Refused(ref m) if m.contains("API key")));

        assert!(parse_google(&json!({"results": []})).is_err());
    }
}
