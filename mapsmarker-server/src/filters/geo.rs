//! Great-circle distance filter
//!
//! Distance is a computed expression over the marker's coordinates, so it
//! can only filter after aggregation (`HAVING`) on grouped queries.

use serde::{Deserialize, Serialize};
use sqlx::{Postgres, QueryBuilder};

/// Earth radius used for metric distances (meters)
pub const EARTH_RADIUS_METRIC: f64 = 6_371_000.0;

/// Earth radius used for imperial distances (thousandths of a mile)
pub const EARTH_RADIUS_IMPERIAL: f64 = 3_959_000.0;

/// Unit system for radius filtering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceUnit {
    #[default]
    Metric,
    Imperial,
}

impl DistanceUnit {
    /// Only the exact string `imperial` selects imperial units.
    pub fn from_setting(raw: Option<&str>) -> Self {
        match raw {
            Some("imperial") => Self::Imperial,
            _ => Self::Metric,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Metric => "metric",
            Self::Imperial => "imperial",
        }
    }

    pub fn earth_radius(self) -> f64 {
        match self {
            Self::Metric => EARTH_RADIUS_METRIC,
            Self::Imperial => EARTH_RADIUS_IMPERIAL,
        }
    }
}

/// Keep markers within `radius` of a point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusFilter {
    pub lat: f64,
    pub lng: f64,
    pub radius: u64,
    pub unit: DistanceUnit,
}

impl RadiusFilter {
    /// Push the haversine distance between the filter point and
    /// `<alias>.lat`/`<alias>.lng`.
    ///
    /// The cosine sum is clamped to [-1, 1] because rounding can push it
    /// just past 1 for coincident points, where ACOS would fail.
    pub fn push_distance(&self, qb: &mut QueryBuilder<'_, Postgres>, alias: &'static str) {
        qb.push(format!("{:.1} * ACOS(LEAST(1.0, GREATEST(-1.0, COS(RADIANS(", self.unit.earth_radius()));
        qb.push_bind(self.lat);
        qb.push(format!(")) * COS(RADIANS({alias}.lat)) * COS(RADIANS({alias}.lng) - RADIANS("));
        qb.push_bind(self.lng);
        qb.push(")) + SIN(RADIANS(");
        qb.push_bind(self.lat);
        qb.push(format!(")) * SIN(RADIANS({alias}.lat)))))"));
    }

    /// Push `<distance> <= radius`.
    pub fn push_predicate(&self, qb: &mut QueryBuilder<'_, Postgres>, alias: &'static str) {
        self.push_distance(qb, alias);
        qb.push(" <= ");
        qb.push_bind(self.radius as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_from_setting() {
        assert_eq!(DistanceUnit::from_setting(Some("imperial")), DistanceUnit::Imperial);
        assert_eq!(DistanceUnit::from_setting(Some("Imperial")), DistanceUnit::Metric);
        assert_eq!(DistanceUnit::from_setting(Some("miles")), DistanceUnit::Metric);
        assert_eq!(DistanceUnit::from_setting(None), DistanceUnit::Metric);
    }

    #[test]
    fn distance_expression_binds_coordinates() {
        let filter = RadiusFilter {
            lat: 48.2,
            lng: 16.37,
            radius: 500,
            unit: DistanceUnit::Metric,
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
        filter.push_predicate(&mut qb, "markers");
        let sql = qb.sql();

        assert!(sql.starts_with("SELECT 6371000.0 * ACOS(LEAST(1.0, GREATEST(-1.0,"));
        assert!(sql.contains("COS(RADIANS($1)) * COS(RADIANS(markers.lat))"));
        assert!(sql.contains("RADIANS(markers.lng) - RADIANS($2)"));
        assert!(sql.contains("SIN(RADIANS($3)) * SIN(RADIANS(markers.lat))"));
        assert!(sql.ends_with(" <= $4"));
        assert!(!sql.contains("48.2"));
    }

    #[test]
    fn imperial_uses_imperial_radius() {
        let filter = RadiusFilter {
            lat: 0.0,
            lng: 0.0,
            radius: 0,
            unit: DistanceUnit::Imperial,
        };
        let mut qb = QueryBuilder::<Postgres>::new("");
        filter.push_distance(&mut qb, "markers");
        assert!(qb.sql().starts_with("3959000.0 * ACOS"));
    }
}
