//! Filter compiler - turns [`FilterOptions`] into SQL fragments
//!
//! Every value is a bound parameter. Identifiers (column names, sort
//! direction) only ever come from the static column tables below, so
//! `orderby` cannot inject SQL.

use sqlx::{Postgres, QueryBuilder};

use super::geo::{DistanceUnit, RadiusFilter};
use super::options::FilterOptions;
use crate::models::IdList;

/// `(option name, qualified column)` for the maps table
const MAP_COLUMNS: &[(&str, &str)] = &[
    ("id", "maps.id"),
    ("name", "maps.name"),
    ("settings", "maps.settings"),
    ("filters", "maps.filters"),
    ("geojson", "maps.geojson"),
    ("created_by", "maps.created_by"),
    ("created_on", "maps.created_on"),
    ("updated_by", "maps.updated_by"),
    ("updated_on", "maps.updated_on"),
];

const MARKER_COLUMNS: &[(&str, &str)] = &[
    ("id", "markers.id"),
    ("name", "markers.name"),
    ("address", "markers.address"),
    ("lat", "markers.lat"),
    ("lng", "markers.lng"),
    ("zoom", "markers.zoom"),
    ("icon", "markers.icon"),
    ("popup", "markers.popup"),
    ("link", "markers.link"),
    ("blank", "markers.blank"),
    ("created_by", "markers.created_by"),
    ("created_on", "markers.created_on"),
    ("updated_by", "markers.updated_by"),
    ("updated_on", "markers.updated_on"),
];

const LAYER_COLUMNS: &[(&str, &str)] = &[
    ("id", "layers.id"),
    ("wms", "layers.wms"),
    ("overlay", "layers.overlay"),
    ("name", "layers.name"),
    ("url", "layers.url"),
    ("options", "layers.options"),
];

/// Columns searched by the `contains` option
const CONTAINS_COLUMNS: &[&str] = &["markers.name", "markers.address", "markers.popup"];

/// Relationship column used by `include_maps` / `exclude_maps`
const REL_MAP_COLUMN: &str = "rels.map_id";

/// Which table a filter is compiled against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Maps,
    Markers,
    Layers,
}

impl Scope {
    /// Table alias used in generated SQL
    pub fn alias(self) -> &'static str {
        match self {
            Self::Maps => "maps",
            Self::Markers => "markers",
            Self::Layers => "layers",
        }
    }

    fn columns(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Maps => MAP_COLUMNS,
            Self::Markers => MARKER_COLUMNS,
            Self::Layers => LAYER_COLUMNS,
        }
    }

    /// Qualified column for an option name, if this table has it.
    pub fn column(self, name: &str) -> Option<&'static str> {
        self.columns()
            .iter()
            .find(|(option, _)| *option == name)
            .map(|(_, qualified)| *qualified)
    }

    fn id_column(self) -> &'static str {
        self.columns()[0].1
    }
}

/// Sort direction; descending only for exactly `"desc"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("desc") => Self::Desc,
            _ => Self::Asc,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    /// `column = ANY($n)` or `column <> ALL($n)`
    Ids {
        column: &'static str,
        ids: Vec<i32>,
        exclude: bool,
    },
    /// `(col ILIKE $n OR ...)`
    Like {
        columns: Vec<&'static str>,
        pattern: String,
    },
}

impl Condition {
    fn push(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        match self {
            Self::Ids {
                column,
                ids,
                exclude,
            } => {
                qb.push(*column);
                qb.push(if *exclude { " <> ALL(" } else { " = ANY(" });
                qb.push_bind(ids.clone());
                qb.push(")");
            }
            Self::Like { columns, pattern } => {
                qb.push("(");
                for (i, column) in columns.iter().enumerate() {
                    if i > 0 {
                        qb.push(" OR ");
                    }
                    qb.push(*column);
                    qb.push(" ILIKE ");
                    qb.push_bind(pattern.clone());
                }
                qb.push(")");
            }
        }
    }
}

/// Escape LIKE wildcards and wrap the needle for a substring match.
pub fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Filter options resolved against one table.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    scope: Scope,
    conditions: Vec<Condition>,
    radius: Option<RadiusFilter>,
    order_column: &'static str,
    sort: SortOrder,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl FilterOptions {
    /// Resolve these options against `scope`.
    ///
    /// Options the table has no column for are ignored.
    pub fn compile(&self, scope: Scope) -> CompiledFilter {
        let mut conditions = Vec::new();

        let mut ids = |list: &Option<IdList>, column: &'static str, exclude: bool| {
            if let Some(list) = list.as_ref().filter(|l| !l.is_empty()) {
                conditions.push(Condition::Ids {
                    column,
                    ids: list.as_slice().to_vec(),
                    exclude,
                });
            }
        };
        ids(&self.exclude, scope.id_column(), true);
        ids(&self.include, scope.id_column(), false);
        if scope == Scope::Markers {
            ids(&self.exclude_maps, REL_MAP_COLUMN, true);
            ids(&self.include_maps, REL_MAP_COLUMN, false);
        }

        if scope == Scope::Markers {
            if let Some(needle) = self.contains.as_deref().filter(|s| !s.is_empty()) {
                conditions.push(Condition::Like {
                    columns: CONTAINS_COLUMNS.to_vec(),
                    pattern: like_pattern(needle),
                });
            }
        }

        let text_filters = [
            ("name", &self.name),
            ("address", &self.address),
            ("popup", &self.popup),
            ("created_by", &self.created_by),
            ("updated_by", &self.updated_by),
        ];
        for (key, value) in text_filters {
            let Some(needle) = value.as_deref().filter(|s| !s.is_empty()) else {
                continue;
            };
            if let Some(column) = scope.column(key) {
                conditions.push(Condition::Like {
                    columns: vec![column],
                    pattern: like_pattern(needle),
                });
            }
        }

        let radius = match (scope, self.radius, self.lat, self.lng) {
            (Scope::Markers, Some(radius), Some(lat), Some(lng)) => Some(RadiusFilter {
                lat,
                lng,
                radius,
                unit: DistanceUnit::from_setting(self.unit.as_deref()),
            }),
            _ => None,
        };

        let order_column = self
            .orderby
            .as_deref()
            .and_then(|name| scope.column(name))
            .unwrap_or_else(|| scope.id_column());

        let to_i64 = |v: u64| i64::try_from(v).unwrap_or(i64::MAX);

        CompiledFilter {
            scope,
            conditions,
            radius,
            order_column,
            sort: SortOrder::parse(self.sortorder.as_deref()),
            limit: self.limit.map(to_i64),
            offset: self.offset.map(to_i64),
        }
    }
}

impl CompiledFilter {
    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn radius(&self) -> Option<&RadiusFilter> {
        self.radius.as_ref()
    }

    /// Push `, <distance> AS distance` when a radius filter is active.
    pub fn push_distance_column(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        if let Some(radius) = &self.radius {
            qb.push(", ");
            radius.push_distance(qb, self.scope.alias());
            qb.push(" AS distance");
        }
    }

    /// Push the `WHERE` clause. The radius predicate is left for `HAVING`.
    pub fn push_where(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        qb.push(" WHERE 1=1");
        for condition in &self.conditions {
            qb.push(" AND ");
            condition.push(qb);
        }
    }

    /// Push the `WHERE` clause for an ungrouped count, radius included.
    pub fn push_count_where(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        self.push_where(qb);
        if let Some(radius) = &self.radius {
            qb.push(" AND ");
            radius.push_predicate(qb, self.scope.alias());
        }
    }

    /// Push `GROUP BY`, the radius `HAVING`, ordering and paging.
    pub fn push_grouped_tail(&self, qb: &mut QueryBuilder<'_, Postgres>, group_by: &'static str) {
        qb.push(" GROUP BY ");
        qb.push(group_by);
        if let Some(radius) = &self.radius {
            qb.push(" HAVING ");
            radius.push_predicate(qb, self.scope.alias());
        }
        self.push_order_and_paging(qb);
    }

    /// Push `ORDER BY`, `LIMIT` and `OFFSET`.
    pub fn push_order_and_paging(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        qb.push(" ORDER BY ");
        qb.push(self.order_column);
        qb.push(" ");
        qb.push(self.sort.as_sql());
        if let Some(limit) = self.limit {
            qb.push(" LIMIT ");
            qb.push_bind(limit);
        }
        if let Some(offset) = self.offset {
            qb.push(" OFFSET ");
            qb.push_bind(offset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(value: serde_json::Value) -> FilterOptions {
        serde_json::from_value(value).expect("valid options")
    }

    fn marker_sql(opts: &FilterOptions) -> String {
        let filter = opts.compile(Scope::Markers);
        let mut qb = QueryBuilder::<Postgres>::new("SELECT markers.*");
        filter.push_distance_column(&mut qb);
        qb.push(" FROM markers LEFT JOIN rels ON rels.object_id = markers.id");
        filter.push_where(&mut qb);
        filter.push_grouped_tail(&mut qb, "markers.id");
        qb.sql().to_owned()
    }

    #[test]
    fn empty_options_use_default_order() {
        let sql = marker_sql(&FilterOptions::default());
        assert!(sql.ends_with(" WHERE 1=1 GROUP BY markers.id ORDER BY markers.id ASC"));
    }

    #[test]
    fn orderby_outside_whitelist_is_ignored() {
        let sql = marker_sql(&options(json!({ "orderby": "1=1", "sortorder": "desc" })));
        assert!(sql.contains("ORDER BY markers.id DESC"));
        assert!(!sql.contains("1=1 DESC"));
        assert_eq!(sql.matches("1=1").count(), 1, "only the WHERE seed: {sql}");
    }

    #[test]
    fn orderby_known_column() {
        let sql = marker_sql(&options(json!({ "orderby": "name", "sortorder": "desc" })));
        assert!(sql.contains("ORDER BY markers.name DESC"));

        let sql = marker_sql(&options(json!({ "orderby": "name", "sortorder": "DESC" })));
        assert!(sql.contains("ORDER BY markers.name ASC"));
    }

    #[test]
    fn orderby_is_checked_per_table() {
        let filter = options(json!({ "orderby": "address" })).compile(Scope::Maps);
        let mut qb = QueryBuilder::<Postgres>::new("SELECT maps.* FROM maps AS maps");
        filter.push_where(&mut qb);
        filter.push_order_and_paging(&mut qb);
        assert!(qb.sql().ends_with("ORDER BY maps.id ASC"));
    }

    #[test]
    fn id_lists_bind_arrays() {
        let sql = marker_sql(&options(json!({
            "include": "4,2",
            "exclude": [9],
            "include_maps": "1",
            "exclude_maps": "abc,0"
        })));
        assert!(sql.contains("markers.id <> ALL($1)"));
        assert!(sql.contains("markers.id = ANY($2)"));
        assert!(sql.contains("rels.map_id = ANY($3)"));
        // exclude_maps sanitized to nothing adds no clause
        assert!(!sql.contains("rels.map_id <> ALL"));
    }

    #[test]
    fn map_lists_only_apply_to_markers() {
        let filter = options(json!({ "include_maps": "1", "address": "main" })).compile(Scope::Maps);
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1");
        filter.push_where(&mut qb);
        assert_eq!(qb.sql(), "SELECT 1 WHERE 1=1");
    }

    #[test]
    fn text_filters_use_bound_ilike() {
        let sql = marker_sql(&options(json!({
            "contains": "x",
            "name": "caf'e",
            "created_by": "admin"
        })));
        assert!(sql.contains(
            "(markers.name ILIKE $1 OR markers.address ILIKE $2 OR markers.popup ILIKE $3)"
        ));
        assert!(sql.contains("(markers.name ILIKE $4)"));
        assert!(sql.contains("(markers.created_by ILIKE $5)"));
        assert!(!sql.contains("caf'e"));
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
        assert_eq!(like_pattern("plain"), "%plain%");
    }

    #[test]
    fn radius_needs_lat_and_lng() {
        let filter = options(json!({ "radius": 100, "lat": 1.0 })).compile(Scope::Markers);
        assert!(filter.radius().is_none());

        let filter = options(json!({ "radius": 100, "lat": 1.0, "lng": 2.0 })).compile(Scope::Maps);
        assert!(filter.radius().is_none());
    }

    #[test]
    fn radius_adds_distance_column_and_having() {
        let sql = marker_sql(&options(json!({
            "radius": 0, "lat": 0, "lng": 0, "unit": "metric"
        })));
        assert!(sql.contains(") AS distance FROM markers"));
        assert!(sql.contains("GROUP BY markers.id HAVING 6371000.0 * ACOS"));
    }

    #[test]
    fn clause_order() {
        let sql = marker_sql(&options(json!({
            "name": "a",
            "radius": 10, "lat": 1, "lng": 2, "unit": "imperial",
            "orderby": "lat",
            "limit": 5,
            "offset": 10
        })));
        let pos = |needle: &str| sql.find(needle).unwrap_or_else(|| panic!("{needle} in {sql}"));
        assert!(pos(" WHERE ") < pos(" GROUP BY "));
        assert!(pos(" GROUP BY ") < pos(" HAVING 3959000.0"));
        assert!(pos(" HAVING ") < pos(" ORDER BY markers.lat ASC"));
        assert!(pos(" ORDER BY ") < pos(" LIMIT $"));
        assert!(pos(" LIMIT ") < pos(" OFFSET $"));
    }

    #[test]
    fn count_where_includes_radius() {
        let filter = options(json!({ "radius": 5, "lat": 1, "lng": 2 })).compile(Scope::Markers);
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(DISTINCT markers.id) FROM markers");
        filter.push_count_where(&mut qb);
        assert!(qb.sql().contains(" WHERE 1=1 AND 6371000.0 * ACOS"));
        assert!(!qb.sql().contains("HAVING"));
    }

    #[test]
    fn layers_ignore_marker_only_options() {
        let filter = options(json!({
            "contains": "x", "created_by": "me", "name": "osm", "orderby": "overlay"
        }))
        .compile(Scope::Layers);
        let mut qb = QueryBuilder::<Postgres>::new("SELECT layers.* FROM layers AS layers");
        filter.push_where(&mut qb);
        filter.push_order_and_paging(&mut qb);
        assert_eq!(
            qb.sql(),
            "SELECT layers.* FROM layers AS layers WHERE 1=1 AND (layers.name ILIKE $1) \
             ORDER BY layers.overlay ASC"
        );
    }
}
