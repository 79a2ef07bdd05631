//! Mapping gateway (Google Maps HTTP APIs).
//!
//! Reverse geocoding and walking distance are advisory details rendered into
//! the notification; when the coordinates or address are unusable, the
//! methods return explanatory strings as values rather than errors, so the
//! message still renders.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;
use std::fmt;

const MAPS_API_BASE: &str = "https://maps.googleapis.com/";

pub const INVALID_LATLONG: &str = "Invalid lat/long";
pub const NO_ADDRESS_FOUND: &str = "No address found";
pub const NO_WALKABLE_PATH: &str = "Could not find walkable path.";

/// The mapping operations the workflow depends on.
#[async_trait]
pub trait MapService: Send + Sync {
    /// Address at the given coordinates, or one of the explanatory strings.
    async fn reverse_geocode(&self, lat: &str, lon: &str) -> Result<String>;

    /// Coordinates for a street address; `None` when nothing matched.
    async fn geocode(&self, address: &str) -> Result<Option<(f64, f64)>>;

    /// Human-readable walking distance between an address and coordinates,
    /// or the no-walkable-path string.
    async fn walking_distance(&self, address: &str, lat: &str, lon: &str) -> Result<String>;
}

/// Shareable Google Maps directions link between two places.
pub fn directions_url(origin: &str, destination: &str) -> String {
    let safe_origin = origin.replace(' ', "+");
    let safe_destination = destination.replace(' ', "+");
    format!("https://www.google.com/maps/dir/?api=1&origin={safe_origin}&destination={safe_destination}")
}

#[derive(Clone)]
pub struct GoogleMapsClient {
    http: Client,
    base_url: Url,
    api_key: String,
}

impl fmt::Debug for GoogleMapsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleMapsClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GoogleMapsClient {
    pub fn new(api_key: String) -> Self {
        let base_url = Url::parse(MAPS_API_BASE).expect("valid default Maps URL");
        Self::with_base_url(api_key, base_url)
    }

    pub fn with_base_url(api_key: String, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("map-approvalbot/0.1")
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            api_key,
        }
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let url = self.base_url.join(path).context("invalid Maps base URL")?;
        let res = self
            .http
            .get(url)
            .query(query)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .context("failed to reach Maps API")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("maps {path} error {status}: {body}"));
        }
        res.json().await.context("invalid Maps response JSON")
    }
}

#[async_trait]
impl MapService for GoogleMapsClient {
    async fn reverse_geocode(&self, lat: &str, lon: &str) -> Result<String> {
        let latlng = format!("{lat},{lon}");
        let payload = self
            .get("maps/api/geocode/json", &[("latlng", latlng.as_str())])
            .await?;
        let Some(first) = payload.pointer("/results/0") else {
            return Ok(INVALID_LATLONG.to_string());
        };
        // A bare plus code means no street address exists at the pin.
        if first.pointer("/types/0").and_then(Value::as_str) == Some("plus_code") {
            return Ok(NO_ADDRESS_FOUND.to_string());
        }
        Ok(first
            .get("formatted_address")
            .and_then(Value::as_str)
            .unwrap_or(NO_ADDRESS_FOUND)
            .to_string())
    }

    async fn geocode(&self, address: &str) -> Result<Option<(f64, f64)>> {
        let payload = self
            .get("maps/api/geocode/json", &[("address", address)])
            .await?;
        let location = payload.pointer("/results/0/geometry/location");
        let (Some(lat), Some(lon)) = (
            location.and_then(|l| l.get("lat")).and_then(Value::as_f64),
            location.and_then(|l| l.get("lng")).and_then(Value::as_f64),
        ) else {
            return Ok(None);
        };
        Ok(Some((lat, lon)))
    }

    async fn walking_distance(&self, address: &str, lat: &str, lon: &str) -> Result<String> {
        let destination = format!("{lat},{lon}");
        let payload = self
            .get(
                "maps/api/directions/json",
                &[
                    ("origin", address),
                    ("destination", destination.as_str()),
                    ("mode", "walking"),
                ],
            )
            .await?;
        Ok(payload
            .pointer("/routes/0/legs/0/distance/text")
            .and_then(Value::as_str)
            .unwrap_or(NO_WALKABLE_PATH)
            .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directions_url_escapes_spaces() {
        assert_eq!(
            directions_url("100 Main St, Springfield", "38.7775,-77.1836"),
            "https://www.google.com/maps/dir/?api=1&origin=100+Main+St,+Springfield&destination=38.7775,-77.1836"
        );
    }
}
