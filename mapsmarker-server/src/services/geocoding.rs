//! Address geocoding used before marker writes
//!
//! Lookups are attempted once per call. There is no retry; callers decide
//! what a failure means for the write.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

/// Default per-request timeout for HTTP geocoders
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A resolved coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Geocoding failures
#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("geocoding is disabled")]
    Disabled,

    #[error("no match for address '{address}'")]
    NoMatch { address: String },

    #[error("geocoder request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("geocoder returned an invalid coordinate: {value}")]
    InvalidCoordinate { value: String },
}

/// Resolves a free-text address to coordinates.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn lookup(&self, address: &str) -> Result<GeoPoint, GeocodeError>;
}

/// Geocoder that always fails; used when no provider is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledGeocoder;

#[async_trait]
impl Geocoder for DisabledGeocoder {
    async fn lookup(&self, _address: &str) -> Result<GeoPoint, GeocodeError> {
        Err(GeocodeError::Disabled)
    }
}

/// Nominatim-compatible HTTP geocoder (`GET {endpoint}/search?q=...&format=json`).
pub struct NominatimGeocoder {
    http: reqwest::Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

impl NominatimGeocoder {
    pub fn new(endpoint: impl Into<String>, user_agent: &str) -> Result<Self, GeocodeError> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(DEFAULT_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    /// Search endpoint: `<endpoint>/search`.
    pub fn search_url(&self) -> String {
        format!("{}/search", self.endpoint.trim_end_matches('/'))
    }
}

fn parse_coordinate(value: &str) -> Result<f64, GeocodeError> {
    value
        .trim()
        .parse()
        .map_err(|_| GeocodeError::InvalidCoordinate {
            value: value.to_owned(),
        })
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn lookup(&self, address: &str) -> Result<GeoPoint, GeocodeError> {
        let places: Vec<NominatimPlace> = self
            .http
            .get(self.search_url())
            .query(&[("q", address), ("format", "json"), ("limit", "1")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let place = places.into_iter().next().ok_or_else(|| GeocodeError::NoMatch {
            address: address.to_owned(),
        })?;

        Ok(GeoPoint {
            lat: parse_coordinate(&place.lat)?,
            lon: parse_coordinate(&place.lon)?,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Geocoder answering from a fixed table.
    pub(crate) struct FixedGeocoder(pub Vec<(&'static str, GeoPoint)>);

    #[async_trait]
    impl Geocoder for FixedGeocoder {
        async fn lookup(&self, address: &str) -> Result<GeoPoint, GeocodeError> {
            self.0
                .iter()
                .find(|(known, _)| *known == address)
                .map(|(_, point)| *point)
                .ok_or_else(|| GeocodeError::NoMatch {
                    address: address.to_owned(),
                })
        }
    }

    #[tokio::test]
    async fn disabled_always_fails() {
        let err = DisabledGeocoder.lookup("Vienna").await.unwrap_err();
        assert!(matches!(err, GeocodeError::Disabled));
    }

    #[test]
    fn search_url_trims_slash() {
        let geocoder = NominatimGeocoder::new("https://nominatim.example/", "mapsmarker-test").unwrap();
        assert_eq!(geocoder.search_url(), "https://nominatim.example/search");
    }

    #[test]
    fn coordinates_parse_from_strings() {
        assert_eq!(parse_coordinate(" 48.2082 ").unwrap(), 48.2082);
        assert!(matches!(
            parse_coordinate("north"),
            Err(GeocodeError::InvalidCoordinate { .. })
        ));
    }

    #[tokio::test]
    async fn fixed_geocoder_matches_known_addresses() {
        let geocoder = FixedGeocoder(vec![("Stephansplatz 1", GeoPoint { lat: 48.2, lon: 16.37 })]);
        assert_eq!(geocoder.lookup("Stephansplatz 1").await.unwrap().lat, 48.2);
        assert!(geocoder.lookup("nowhere").await.is_err());
    }
}
