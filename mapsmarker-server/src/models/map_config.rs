//! Views over a map's serialized `settings` and `filters` columns

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::sanitize_ids;

/// The subset of map settings the store itself reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MapSettings {
    /// When set, the map shows every marker instead of its own members
    #[serde(rename = "filtersAllMarkers", default, deserialize_with = "truthy")]
    pub filters_all_markers: bool,
}

/// Loose truthiness: `false`, `null`, zero, `""`, `"0"` and empty
/// containers are false, anything else is true.
fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => false,
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(entries) => !entries.is_empty(),
    })
}

impl MapSettings {
    /// Parse the settings column. Unparsable JSON reads as defaults.
    pub fn parse(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_else(|err| {
            tracing::debug!(error = %err, "map settings are not valid JSON, using defaults");
            Self::default()
        })
    }
}

/// Map ids referenced by the keys of a map's `filters` object.
///
/// The filter editor keys each entry by the id of the map it pulls markers
/// from, e.g. `{"4": {...}, "9": {...}}`. Non-object JSON yields no ids.
pub fn filter_map_ids(raw: &str) -> Vec<i32> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(entries)) => sanitize_ids(entries.keys()),
        _ => Vec::new(),
    }
}
