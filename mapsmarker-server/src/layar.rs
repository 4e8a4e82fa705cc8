//! Layar hotspot feed
//!
//! Request parsing and response building are pure; the HTTP handler in
//! `http::routes::layar` only fetches markers and writes the headers.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::db::Marker;
use crate::filters::{DistanceUnit, FilterOptions};
use crate::models::{absint, IdList};

/// `errorCode` for a missing required parameter
pub const ERROR_MISSING_PARAMETER: u8 = 20;

/// `errorCode` when the filters select no markers
pub const ERROR_NO_MARKERS: u8 = 21;

/// How hotspot icons are reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IconMode {
    /// The marker's own icon, or the default marker image
    #[default]
    Mapsmarker,
    /// No icon url, Layar's standard icon
    LayarStandard,
    /// No icon url, the layer's custom icon
    LayarCustom,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayarUnits {
    #[default]
    Km,
    Miles,
}

impl LayarUnits {
    pub fn distance_unit(self) -> DistanceUnit {
        match self {
            Self::Km => DistanceUnit::Metric,
            Self::Miles => DistanceUnit::Imperial,
        }
    }
}

/// Feed settings, the `[layar]` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayarSettings {
    /// Radius used when the request has none
    pub radius: u64,
    pub units: LayarUnits,
    pub icons: IconMode,
    pub footnote: String,
    /// Seconds between client refreshes
    pub refresh_interval: u64,
    /// Meters moved before a client refreshes
    pub refresh_distance: u64,
    /// Prefix joined with a marker's icon file name
    pub icons_url: String,
    /// Image for markers without an icon
    pub default_icon_url: String,
}

impl Default for LayarSettings {
    fn default() -> Self {
        Self {
            radius: 1000,
            units: LayarUnits::Km,
            icons: IconMode::Mapsmarker,
            footnote: String::new(),
            refresh_interval: 300,
            refresh_distance: 100,
            icons_url: "/icons/".to_owned(),
            default_icon_url: "/images/leaflet/marker.png".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Update,
    Refresh,
}

/// A validated feed request.
#[derive(Debug, Clone, PartialEq)]
pub struct LayarRequest {
    pub user_id: String,
    pub layer_name: String,
    pub version: String,
    pub lat: f64,
    pub lon: f64,
    pub country_code: String,
    pub lang: String,
    pub action: Action,
    pub radius: u64,
    pub checkbox_list: Option<String>,
    pub search_box: Option<String>,
}

/// A feed error, reported in the body with HTTP 200.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LayarError {
    #[error("Required parameter missing: {name}")]
    MissingParameter {
        layer: Option<String>,
        name: &'static str,
    },

    #[error("No markers found. Please adjust the filter settings.")]
    NoMarkers { layer: String },
}

impl LayarError {
    pub fn code(&self) -> u8 {
        match self {
            Self::MissingParameter { .. } => ERROR_MISSING_PARAMETER,
            Self::NoMarkers { .. } => ERROR_NO_MARKERS,
        }
    }

    pub fn into_body(self) -> LayarResponse {
        let layer = match &self {
            Self::MissingParameter { layer, .. } => layer.clone(),
            Self::NoMarkers { layer } => Some(layer.clone()),
        };
        LayarResponse {
            layer,
            hotspots: Vec::new(),
            error_code: self.code(),
            error_string: self.to_string(),
            radius: None,
            refresh_interval: None,
            refresh_distance: None,
            full_refresh: None,
        }
    }
}

/// Non-empty value of a query parameter.
fn present<'a>(params: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    params.get(name).map(String::as_str).filter(|v| !v.is_empty())
}

impl LayarRequest {
    /// Validate query parameters.
    ///
    /// Parameters are checked in feed order and the first missing one is
    /// reported. `action` falls back to `refresh` and `radius` to the
    /// configured radius; an explicitly empty `radius` still counts as
    /// missing. Coordinates that do not parse count as missing.
    pub fn parse(params: &HashMap<String, String>, settings: &LayarSettings) -> Result<Self, LayarError> {
        let layer = present(params, "layerName").map(str::to_owned);
        let missing = |name: &'static str| LayarError::MissingParameter {
            layer: layer.clone(),
            name,
        };
        let text = |name: &'static str| present(params, name).map(str::to_owned).ok_or_else(|| missing(name));
        let coordinate = |name: &'static str| {
            present(params, name)
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite())
                .ok_or_else(|| missing(name))
        };

        let user_id = text("userId")?;
        let layer_name = text("layerName")?;
        let version = text("version")?;
        let lat = coordinate("lat")?;
        let lon = coordinate("lon")?;
        let country_code = text("countryCode")?;
        let lang = text("lang")?;
        let action = match params.get("action").map(String::as_str) {
            Some("update") => Action::Update,
            _ => Action::Refresh,
        };
        let radius = match params.get("radius") {
            None => settings.radius,
            Some(raw) if raw.is_empty() => return Err(missing("radius")),
            Some(raw) => absint(raw),
        };

        Ok(Self {
            user_id,
            layer_name,
            version,
            lat,
            lon,
            country_code,
            lang,
            action,
            radius,
            checkbox_list: present(params, "CHECKBOXLIST").map(str::to_owned),
            search_box: present(params, "SEARCHBOX").map(str::to_owned),
        })
    }

    /// Marker filters selecting this request's hotspots.
    ///
    /// The search term must appear in both the name and the popup.
    pub fn filters(&self, settings: &LayarSettings) -> FilterOptions {
        FilterOptions {
            include_maps: self.checkbox_list.as_deref().map(IdList::from),
            name: self.search_box.clone(),
            popup: self.search_box.clone(),
            radius: Some(self.radius),
            lat: Some(self.lat),
            lng: Some(self.lon),
            unit: Some(settings.units.distance_unit().as_str().to_owned()),
            ..FilterOptions::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Geolocation {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anchor {
    pub geolocation: Geolocation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HotspotText {
    pub title: String,
    pub description: String,
    pub footnote: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HotspotIcon {
    pub url: Option<String>,
    #[serde(rename = "type")]
    pub kind: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hotspot {
    pub id: i32,
    pub anchor: Anchor,
    pub text: HotspotText,
    #[serde(rename = "imageURL")]
    pub image_url: String,
    pub icon: HotspotIcon,
}

impl Hotspot {
    pub fn from_marker(marker: &Marker, settings: &LayarSettings) -> Self {
        let image_url = if marker.icon.is_empty() {
            settings.default_icon_url.clone()
        } else {
            format!("{}{}", settings.icons_url, marker.icon)
        };
        let icon = match settings.icons {
            IconMode::Mapsmarker => HotspotIcon {
                url: Some(image_url.clone()),
                kind: 0,
            },
            IconMode::LayarStandard => HotspotIcon { url: None, kind: 0 },
            IconMode::LayarCustom => HotspotIcon { url: None, kind: 1 },
        };

        Self {
            id: marker.id,
            anchor: Anchor {
                geolocation: Geolocation {
                    lat: marker.lat,
                    lon: marker.lng,
                },
            },
            text: HotspotText {
                title: marker.name.clone(),
                description: strip_tags(&marker.popup),
                footnote: settings.footnote.clone(),
            },
            image_url,
            icon,
        }
    }
}

/// Feed response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayarResponse {
    pub layer: Option<String>,
    pub hotspots: Vec<Hotspot>,
    pub error_code: u8,
    pub error_string: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radius: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_interval: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_distance: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_refresh: Option<bool>,
}

impl LayarResponse {
    /// Build the success body, or `NoMarkers` when there is nothing to show.
    pub fn build(request: &LayarRequest, markers: &[Marker], settings: &LayarSettings) -> Result<Self, LayarError> {
        if markers.is_empty() {
            return Err(LayarError::NoMarkers {
                layer: request.layer_name.clone(),
            });
        }

        Ok(Self {
            layer: Some(request.layer_name.clone()),
            hotspots: markers.iter().map(|m| Hotspot::from_marker(m, settings)).collect(),
            error_code: 0,
            error_string: "OK".to_owned(),
            radius: Some(request.radius),
            refresh_interval: Some(settings.refresh_interval),
            refresh_distance: Some(settings.refresh_distance),
            full_refresh: Some(request.action == Action::Refresh),
        })
    }
}

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->|<[^>]*>").expect("valid regex"));

/// Remove HTML comments and tags, keeping text content.
pub fn strip_tags(html: &str) -> String {
    TAG.replace_all(html, "").into_owned()
}
