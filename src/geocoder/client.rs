use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::db::models::Location;
use crate::error::AppError;

/// An address resolved to coordinates.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeocodedAddress {
    pub latitude: f64,
    pub longitude: f64,
    pub formatted_address: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zipcode: Option<String>,
    pub country: Option<String>,
}

impl GeocodedAddress {
    /// GeoJSON point carrying the resolved address components.
    pub fn into_location(self) -> Location {
        Location {
            formatted_address: self.formatted_address,
            street: self.street,
            city: self.city,
            state: self.state,
            zipcode: self.zipcode,
            country: self.country,
            ..Location::point(self.longitude, self.latitude)
        }
    }
}

/// Trait for address lookups, enabling mock testing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolve a free-form address or zipcode. `None` when nothing matched.
    async fn geocode(&self, address: &str) -> Result<Option<GeocodedAddress>, AppError>;
}

#[derive(Debug, Deserialize)]
struct MapQuestResponse {
    #[serde(default)]
    results: Vec<MapQuestResult>,
}

#[derive(Debug, Deserialize)]
struct MapQuestResult {
    #[serde(default)]
    locations: Vec<MapQuestLocation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MapQuestLocation {
    #[serde(default)]
    street: String,
    /// City.
    #[serde(default)]
    admin_area5: String,
    /// State.
    #[serde(default)]
    admin_area3: String,
    /// Country code.
    #[serde(default)]
    admin_area1: String,
    #[serde(default)]
    postal_code: String,
    lat_lng: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl From<MapQuestLocation> for GeocodedAddress {
    fn from(loc: MapQuestLocation) -> Self {
        let state_zip = [loc.admin_area3.trim(), loc.postal_code.trim()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let formatted = [
            loc.street.trim(),
            loc.admin_area5.trim(),
            state_zip.as_str(),
            loc.admin_area1.trim(),
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ");

        GeocodedAddress {
            latitude: loc.lat_lng.lat,
            longitude: loc.lat_lng.lng,
            formatted_address: non_empty(formatted),
            street: non_empty(loc.street),
            city: non_empty(loc.admin_area5),
            state: non_empty(loc.admin_area3),
            zipcode: non_empty(loc.postal_code),
            country: non_empty(loc.admin_area1),
        }
    }
}

/// MapQuest geocoding API client.
pub struct MapQuestGeocoder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl MapQuestGeocoder {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Geocoder(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl Geocoder for MapQuestGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<GeocodedAddress>, AppError> {
        let url = format!("{}/geocoding/v1/address", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("key", self.api_key.as_str()), ("location", address)])
            .send()
            .await
            .map_err(|e| AppError::Geocoder(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Geocoder(format!(
                "Geocoding service returned {}",
                response.status()
            )));
        }

        let body: MapQuestResponse = response
            .json()
            .await
            .map_err(|e| AppError::Geocoder(format!("Unexpected response: {e}")))?;

        let first = body
            .results
            .into_iter()
            .next()
            .and_then(|r| r.locations.into_iter().next());

        tracing::debug!(address, found = first.is_some(), "Geocoded address");
        Ok(first.map(GeocodedAddress::from))
    }
}
