//! Untyped filter options as they arrive from query strings or JSON

use serde::{Deserialize, Deserializer};

use crate::models::{absint, IdList};

/// Named filter options for map, marker and layer listings.
///
/// Unknown keys are ignored. Numeric options accept numbers or numeric
/// strings; `limit`, `offset` and `radius` are coerced to absolute integers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FilterOptions {
    pub exclude: Option<IdList>,
    pub include: Option<IdList>,
    pub exclude_maps: Option<IdList>,
    pub include_maps: Option<IdList>,
    pub contains: Option<String>,
    pub name: Option<String>,
    pub address: Option<String>,
    pub popup: Option<String>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub orderby: Option<String>,
    pub sortorder: Option<String>,
    #[serde(deserialize_with = "loose_uint")]
    pub limit: Option<u64>,
    #[serde(deserialize_with = "loose_uint")]
    pub offset: Option<u64>,
    #[serde(deserialize_with = "loose_uint")]
    pub radius: Option<u64>,
    #[serde(deserialize_with = "loose_float")]
    pub lat: Option<f64>,
    #[serde(deserialize_with = "loose_float")]
    pub lng: Option<f64>,
    pub unit: Option<String>,
}

impl FilterOptions {
    /// Newest first, capped at `limit` rows.
    pub fn recent(limit: u64) -> Self {
        Self {
            orderby: Some("id".into()),
            sortorder: Some("desc".into()),
            limit: Some(limit),
            ..Self::default()
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Int(i64),
    Float(f64),
    Text(String),
}

fn loose_uint<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Loose>::deserialize(deserializer)?.map(|value| match value {
        Loose::Int(n) => n.unsigned_abs(),
        Loose::Float(f) => f.abs().trunc() as u64,
        Loose::Text(s) => absint(&s),
    }))
}

fn loose_float<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Loose>::deserialize(deserializer)?.map(|value| match value {
        Loose::Int(n) => n as f64,
        Loose::Float(f) => f,
        Loose::Text(s) => s.trim().parse().unwrap_or(0.0),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ignores_unknown_keys() {
        let opts: FilterOptions = serde_json::from_value(json!({
            "name": "cafe",
            "bogus": "DROP TABLE",
            "units": "imperial"
        }))
        .unwrap();
        assert_eq!(opts.name.as_deref(), Some("cafe"));
        assert!(opts.unit.is_none());
    }

    #[test]
    fn numeric_options_are_lenient() {
        let opts: FilterOptions = serde_json::from_value(json!({
            "limit": "-10",
            "offset": 5,
            "radius": 250.9,
            "lat": "48.2",
            "lng": 16
        }))
        .unwrap();
        assert_eq!(opts.limit, Some(10));
        assert_eq!(opts.offset, Some(5));
        assert_eq!(opts.radius, Some(250));
        assert_eq!(opts.lat, Some(48.2));
        assert_eq!(opts.lng, Some(16.0));
    }

    #[test]
    fn garbage_numbers_coerce_to_zero() {
        let opts: FilterOptions =
            serde_json::from_value(json!({ "limit": "lots", "lat": "north" })).unwrap();
        assert_eq!(opts.limit, Some(0));
        assert_eq!(opts.lat, Some(0.0));
    }

    #[test]
    fn id_lists_are_sanitized() {
        let opts: FilterOptions = serde_json::from_value(json!({
            "include": ["3", "3", "abc", "0", "5"],
            "exclude_maps": "7,2"
        }))
        .unwrap();
        assert_eq!(opts.include.unwrap().as_slice(), &[3, 5]);
        assert_eq!(opts.exclude_maps.unwrap().as_slice(), &[2, 7]);
    }

    #[test]
    fn recent_orders_by_id_desc() {
        let opts = FilterOptions::recent(5);
        assert_eq!(opts.orderby.as_deref(), Some("id"));
        assert_eq!(opts.sortorder.as_deref(), Some("desc"));
        assert_eq!(opts.limit, Some(5));
    }
}
