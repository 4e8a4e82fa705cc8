//! Marker repository
//!
//! Every marker read aggregates the ids of the maps the marker belongs to
//! (`maps`), so listings are one grouped query with no per-row lookups.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use super::{push_row_id, rows_per_statement, sync_id_sequence, DbError, Tables};
use crate::filters::{CompiledFilter, FilterOptions, Scope};
use crate::models::{positive_id, BulkUpdate, IdList, RelationType, UpdateOutcome};
use crate::services::translations::register_marker;
use crate::services::{Geocoder, TranslationSink};

/// Marker record with the maps it belongs to
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Marker {
    pub id: i32,
    pub name: String,
    pub address: String,
    pub lat: f64,
    pub lng: f64,
    pub zoom: f64,
    pub icon: String,
    pub popup: String,
    pub link: String,
    pub blank: bool,
    pub created_by: String,
    pub created_on: DateTime<Utc>,
    pub updated_by: String,
    pub updated_on: DateTime<Utc>,
    /// Ids of the maps this marker is assigned to, ascending
    pub maps: Vec<i32>,
    /// Distance from the radius filter origin, only for radius queries
    #[sqlx(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

/// Column values for inserting or overwriting a marker.
///
/// Coordinates may be omitted when the marker will be geocoded.
#[derive(Debug, Clone, Deserialize)]
pub struct MarkerDraft {
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub lng: f64,
    pub zoom: f64,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub popup: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub blank: bool,
    #[serde(default)]
    pub created_by: String,
    #[serde(default = "Utc::now")]
    pub created_on: DateTime<Utc>,
    #[serde(default)]
    pub updated_by: String,
    #[serde(default = "Utc::now")]
    pub updated_on: DateTime<Utc>,
}

const INSERT_COLUMNS: &str = "(id, name, address, lat, lng, zoom, icon, popup, link, blank, \
     created_by, created_on, updated_by, updated_on) ";

/// Marker repository
#[derive(Clone)]
pub struct MarkerRepo {
    pool: PgPool,
    tables: Arc<Tables>,
    geocoder: Arc<dyn Geocoder>,
    translations: Arc<dyn TranslationSink>,
}

impl MarkerRepo {
    pub fn new(
        pool: PgPool,
        tables: Arc<Tables>,
        geocoder: Arc<dyn Geocoder>,
        translations: Arc<dyn TranslationSink>,
    ) -> Self {
        Self {
            pool,
            tables,
            geocoder,
            translations,
        }
    }

    /// `SELECT ... FROM markers LEFT JOIN rels`, optionally with a distance column.
    fn select<'args>(&self, filter: Option<&CompiledFilter>) -> QueryBuilder<'args, Postgres> {
        let mut qb = QueryBuilder::new(
            "SELECT markers.*, \
             ARRAY_REMOVE(ARRAY_AGG(rels.map_id ORDER BY rels.map_id), NULL) AS maps",
        );
        if let Some(filter) = filter {
            filter.push_distance_column(&mut qb);
        }
        qb.push(format!(
            " FROM {} AS markers LEFT JOIN {} AS rels \
             ON rels.object_id = markers.id AND rels.type_id = ",
            self.tables.markers, self.tables.rels
        ));
        qb.push_bind(RelationType::MARKER.as_i16());
        qb
    }

    pub async fn get(&self, id: i64) -> Result<Marker, DbError> {
        let id = positive_id("id", id)?;
        let mut qb = self.select(None);
        qb.push(" WHERE markers.id = ");
        qb.push_bind(id);
        qb.push(" GROUP BY markers.id");

        qb.build_query_as::<Marker>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound {
                resource: "marker",
                id: id.to_string(),
            })
    }

    /// Get the markers with the given ids, ascending by id. Unknown ids are skipped.
    pub async fn get_many(&self, ids: &IdList) -> Result<Vec<Marker>, DbError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = self.select(None);
        qb.push(" WHERE markers.id = ANY(");
        qb.push_bind(ids.as_slice());
        qb.push(") GROUP BY markers.id ORDER BY markers.id");

        Ok(qb.build_query_as::<Marker>().fetch_all(&self.pool).await?)
    }

    /// List markers matching `filters`.
    ///
    /// With `radius`, `lat` and `lng` set, rows carry a `distance` and only
    /// markers within the radius are returned.
    pub async fn all(&self, filters: &FilterOptions) -> Result<Vec<Marker>, DbError> {
        let compiled = filters.compile(Scope::Markers);
        let mut qb = self.select(Some(&compiled));
        compiled.push_where(&mut qb);
        compiled.push_grouped_tail(&mut qb, "markers.id");

        Ok(qb.build_query_as::<Marker>().fetch_all(&self.pool).await?)
    }

    /// Count distinct markers matching `filters`. Ordering and paging are ignored.
    pub async fn count(&self, filters: &FilterOptions) -> Result<i64, DbError> {
        let compiled = filters.compile(Scope::Markers);
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT COUNT(DISTINCT markers.id) FROM {} AS markers LEFT JOIN {} AS rels \
             ON rels.object_id = markers.id AND rels.type_id = ",
            self.tables.markers, self.tables.rels
        ));
        qb.push_bind(RelationType::MARKER.as_i16());
        compiled.push_count_where(&mut qb);

        Ok(qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?)
    }

    /// Markers assigned to a map.
    pub async fn for_map(&self, map_id: i64) -> Result<Vec<Marker>, DbError> {
        let map_id = positive_id("map_id", map_id)?;
        self.for_maps(&IdList::from(vec![map_id])).await
    }

    /// Markers assigned to any of the maps, each listed once.
    pub async fn for_maps(&self, map_ids: &IdList) -> Result<Vec<Marker>, DbError> {
        if map_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = self.select(None);
        qb.push(format!(
            " WHERE EXISTS (SELECT 1 FROM {} AS member \
             WHERE member.object_id = markers.id AND member.type_id = ",
            self.tables.rels
        ));
        qb.push_bind(RelationType::MARKER.as_i16());
        qb.push(" AND member.map_id = ANY(");
        qb.push_bind(map_ids.as_slice());
        qb.push(")) GROUP BY markers.id ORDER BY markers.id");

        Ok(qb.build_query_as::<Marker>().fetch_all(&self.pool).await?)
    }

    /// Coordinates to store for `draft`, geocoding its address when asked to.
    async fn coordinates(&self, draft: &MarkerDraft, geocode: bool) -> Result<(f64, f64), DbError> {
        if !geocode {
            return Ok((draft.lat, draft.lng));
        }
        if draft.address.trim().is_empty() {
            return Err(DbError::MissingAddress);
        }

        match self.geocoder.lookup(&draft.address).await {
            Ok(point) => Ok((point.lat, point.lon)),
            Err(err) => {
                tracing::warn!(address = %draft.address, error = %err, "geocoding failed");
                Err(err.into())
            }
        }
    }

    /// Insert a marker, returning its id.
    ///
    /// With `geocode`, the draft's coordinates are replaced by the geocoded
    /// position of its address; a failed lookup inserts nothing.
    pub async fn add(&self, draft: &MarkerDraft, geocode: bool, id: Option<i32>) -> Result<i32, DbError> {
        let (lat, lng) = self.coordinates(draft, geocode).await?;
        let row = [(
            id,
            MarkerDraft {
                lat,
                lng,
                ..draft.clone()
            },
        )];

        let id = self
            .insert(&row)
            .await?
            .into_iter()
            .next()
            .ok_or(DbError::EmptyBatch { resource: "markers" })?;

        register_marker(self.translations.as_ref(), id, &draft.name, &draft.address, &draft.popup);
        tracing::debug!(marker_id = id, geocoded = geocode, "marker added");
        Ok(id)
    }

    /// Insert many markers in multi-row statements, returning the new ids in order.
    pub async fn add_bulk(&self, rows: &[(Option<i32>, MarkerDraft)]) -> Result<Vec<i32>, DbError> {
        if rows.is_empty() {
            return Err(DbError::EmptyBatch { resource: "markers" });
        }
        let ids = self.insert(rows).await?;
        tracing::debug!(count = ids.len(), "markers added");
        Ok(ids)
    }

    async fn insert(&self, rows: &[(Option<i32>, MarkerDraft)]) -> Result<Vec<i32>, DbError> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(rows.len());

        for chunk in rows.chunks(rows_per_statement(14)) {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO {} {INSERT_COLUMNS}", self.tables.markers));
            qb.push_values(chunk, |mut row, (id, draft)| {
                push_row_id(&mut row, *id);
                row.push_bind(&draft.name)
                    .push_bind(&draft.address)
                    .push_bind(draft.lat)
                    .push_bind(draft.lng)
                    .push_bind(draft.zoom)
                    .push_bind(&draft.icon)
                    .push_bind(&draft.popup)
                    .push_bind(&draft.link)
                    .push_bind(draft.blank)
                    .push_bind(&draft.created_by)
                    .push_bind(draft.created_on)
                    .push_bind(&draft.updated_by)
                    .push_bind(draft.updated_on);
            });
            qb.push(" RETURNING id");
            ids.extend(qb.build_query_scalar::<i32>().fetch_all(&mut *tx).await?);
        }

        if rows.iter().any(|(id, _)| id.is_some_and(|id| id > 0)) {
            sync_id_sequence(&mut *tx, &self.tables.markers).await?;
        }
        tx.commit().await?;
        Ok(ids)
    }

    /// Overwrite `ids` with the draft's content, reporting which rows changed.
    ///
    /// Audit columns are written but do not count as a change on their own.
    async fn overwrite(
        &self,
        ids: &[i32],
        draft: &MarkerDraft,
        (lat, lng): (f64, f64),
    ) -> Result<BulkUpdate, DbError> {
        let sql = format!(
            r#"
            WITH targets AS (
                SELECT id FROM {markers} WHERE id = ANY($1)
            ),
            changed AS (
                UPDATE {markers}
                SET name = $2, address = $3, lat = $4, lng = $5, zoom = $6,
                    icon = $7, popup = $8, link = $9, blank = $10,
                    updated_by = $11, updated_on = $12
                WHERE id = ANY($1)
                  AND (name, address, lat, lng, zoom, icon, popup, link, blank)
                      IS DISTINCT FROM ($2::text, $3::text, $4::float8, $5::float8, $6::float8,
                                        $7::text, $8::text, $9::text, $10::boolean)
                RETURNING id
            )
            SELECT
                (SELECT COUNT(*) FROM targets),
                COALESCE((SELECT ARRAY_AGG(id ORDER BY id) FROM changed), '{{}}')
            "#,
            markers = self.tables.markers
        );

        let (found, updated): (i64, Vec<i32>) = sqlx::query_as(&sql)
            .bind(ids)
            .bind(&draft.name)
            .bind(&draft.address)
            .bind(lat)
            .bind(lng)
            .bind(draft.zoom)
            .bind(&draft.icon)
            .bind(&draft.popup)
            .bind(&draft.link)
            .bind(draft.blank)
            .bind(&draft.updated_by)
            .bind(draft.updated_on)
            .fetch_one(&self.pool)
            .await?;

        for &id in &updated {
            register_marker(self.translations.as_ref(), id, &draft.name, &draft.address, &draft.popup);
        }
        Ok(BulkUpdate { found, updated })
    }

    /// Overwrite a marker's content, geocoding its address when asked to.
    pub async fn update(&self, draft: &MarkerDraft, id: i64, geocode: bool) -> Result<UpdateOutcome, DbError> {
        let id = positive_id("id", id)?;
        let coords = self.coordinates(draft, geocode).await?;

        let result = self.overwrite(&[id], draft, coords).await?;
        Ok(UpdateOutcome::from_flags(result.found > 0, !result.updated.is_empty()))
    }

    /// Overwrite many markers with the same content. The address is geocoded once.
    pub async fn update_bulk(&self, draft: &MarkerDraft, ids: &IdList, geocode: bool) -> Result<BulkUpdate, DbError> {
        if ids.is_empty() {
            return Err(DbError::EmptyBatch { resource: "markers" });
        }
        let coords = self.coordinates(draft, geocode).await?;
        self.overwrite(ids.as_slice(), draft, coords).await
    }

    /// Delete a marker and its relationship rows.
    pub async fn delete(&self, id: i64) -> Result<u64, DbError> {
        let id = positive_id("id", id)?;
        self.delete_where(&[id]).await
    }

    /// Delete many markers and their relationship rows.
    pub async fn delete_bulk(&self, ids: &IdList) -> Result<u64, DbError> {
        if ids.is_empty() {
            return Err(DbError::EmptyBatch { resource: "markers" });
        }
        self.delete_where(ids.as_slice()).await
    }

    async fn delete_where(&self, ids: &[i32]) -> Result<u64, DbError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("DELETE FROM {} WHERE id = ANY($1)", self.tables.markers);
        let deleted = sqlx::query(&sql).bind(ids).execute(&mut *tx).await?.rows_affected();

        let sql = format!(
            "DELETE FROM {} WHERE type_id = $1 AND object_id = ANY($2)",
            self.tables.rels
        );
        let unlinked = sqlx::query(&sql)
            .bind(RelationType::MARKER.as_i16())
            .bind(ids)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        tracing::debug!(deleted, unlinked, "markers deleted");
        Ok(deleted)
    }
}
