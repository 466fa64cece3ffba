use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::model::GeoPoint;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeocodeHit {
    pub label: String,
    pub point: GeoPoint,
    pub province: Option<String>,
}

/// Lookup never fails from the caller's point of view; an unavailable
/// provider yields no hits.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn forward(&self, query: &str) -> Vec<GeocodeHit>;
    async fn reverse(&self, point: GeoPoint) -> Vec<GeocodeHit>;
}

#[derive(Debug, Deserialize)]
struct Place {
    display_name: String,
    lat: Value,
    lon: Value,
    #[serde(default)]
    address: Option<Address>,
}

#[derive(Debug, Default, Deserialize)]
struct Address {
    state: Option<String>,
    province: Option<String>,
    city: Option<String>,
}

impl Place {
    fn into_hit(self) -> Option<GeocodeHit> {
        let coord = |v: &Value| match v {
            Value::String(s) => s.parse::<f64>().ok(),
            Value::Number(n) => n.as_f64(),
            _ => None,
        };
        let point = GeoPoint::new(coord(&self.lat)?, coord(&self.lon)?);
        if !point.is_valid() {
            return None;
        }
        let province = self.address.and_then(|a| a.province.or(a.state).or(a.city));
        Some(GeocodeHit { label: self.display_name, point, province })
    }
}

/// Nominatim-compatible geocoder, throttled to the provider's usage policy.
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
    country_codes: Option<String>,
    limiter: DefaultDirectRateLimiter,
}

impl NominatimGeocoder {
    pub fn new(base_url: impl Into<String>, min_interval: Duration, timeout: Duration) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("patrol_sync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let quota = Quota::with_period(min_interval).unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN));
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            country_codes: None,
            limiter: RateLimiter::direct(quota),
        })
    }

    pub fn with_country_codes(mut self, codes: impl Into<String>) -> Self {
        self.country_codes = Some(codes.into());
        self
    }

    fn search_url(&self, query: &str) -> String {
        let mut url = format!(
            "{}/search?format=jsonv2&addressdetails=1&limit=5&q={}",
            self.base_url,
            urlencoding::encode(query.trim())
        );
        if let Some(codes) = &self.country_codes {
            url.push_str(&format!("&countrycodes={}", urlencoding::encode(codes)));
        }
        url
    }

    fn reverse_url(&self, point: GeoPoint) -> String {
        format!(
            "{}/reverse?format=jsonv2&addressdetails=1&lat={}&lon={}",
            self.base_url, point.lat, point.lon
        )
    }

    async fn get(&self, url: &str) -> SyncResult<Value> {
        self.limiter.until_ready().await;
        debug!(url = %url, "Geocoding request");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status { endpoint: url.to_string(), status: status.as_u16() });
        }
        Ok(response.json().await?)
    }
}

/// Search returns a list of places; reverse returns one place or an
/// `{"error": ...}` object.
fn parse_places(payload: Value) -> Vec<GeocodeHit> {
    let places = match payload {
        Value::Array(items) => items,
        Value::Object(obj) if obj.contains_key("error") => Vec::new(),
        other @ Value::Object(_) => vec![other],
        _ => Vec::new(),
    };
    places
        .into_iter()
        .filter_map(|p| serde_json::from_value::<Place>(p).ok())
        .filter_map(Place::into_hit)
        .collect()
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn forward(&self, query: &str) -> Vec<GeocodeHit> {
        if query.trim().is_empty() {
            return Vec::new();
        }
        match self.get(&self.search_url(query)).await {
            Ok(payload) => parse_places(payload),
            Err(err) => {
                warn!(error = %err, "Forward geocoding failed");
                Vec::new()
            }
        }
    }

    async fn reverse(&self, point: GeoPoint) -> Vec<GeocodeHit> {
        if !point.is_valid() {
            return Vec::new();
        }
        match self.get(&self.reverse_url(point)).await {
            Ok(payload) => parse_places(payload),
            Err(err) => {
                warn!(error = %err, "Reverse geocoding failed");
                Vec::new()
            }
        }
    }
}
