//! Map repository
//!
//! - get/get_many/all: optional marker count per map
//! - update: tri-state outcome from a single CTE statement
//! - delete: removes the map's relationship rows in the same transaction

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use super::{push_row_id, rows_per_statement, sync_id_sequence, DbError, Tables};
use crate::filters::{FilterOptions, Scope};
use crate::models::{filter_map_ids, positive_id, BulkUpdate, IdList, MapSettings, RelationType, UpdateOutcome};
use crate::services::translations::register_map;
use crate::services::TranslationSink;

/// Map record from database
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Map {
    pub id: i32,
    pub name: String,
    pub settings: String,
    pub filters: String,
    pub geojson: String,
    pub created_by: String,
    pub created_on: DateTime<Utc>,
    pub updated_by: String,
    pub updated_on: DateTime<Utc>,
    /// Number of markers shown on the map, when requested
    #[sqlx(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markers: Option<i64>,
}

/// Column values for inserting or overwriting a map.
///
/// `created_*` are ignored by updates. When deserialized, omitted JSON
/// columns default to `{}` and omitted timestamps to now.
#[derive(Debug, Clone, Deserialize)]
pub struct MapDraft {
    pub name: String,
    #[serde(default = "empty_object")]
    pub settings: String,
    #[serde(default = "empty_object")]
    pub filters: String,
    #[serde(default)]
    pub geojson: String,
    #[serde(default)]
    pub created_by: String,
    #[serde(default = "Utc::now")]
    pub created_on: DateTime<Utc>,
    #[serde(default)]
    pub updated_by: String,
    #[serde(default = "Utc::now")]
    pub updated_on: DateTime<Utc>,
}

fn empty_object() -> String {
    "{}".to_owned()
}

const INSERT_COLUMNS: &str =
    "(id, name, settings, filters, geojson, created_by, created_on, updated_by, updated_on) ";

/// Map repository
#[derive(Clone)]
pub struct MapRepo {
    pool: PgPool,
    tables: Arc<Tables>,
    translations: Arc<dyn TranslationSink>,
}

impl MapRepo {
    pub fn new(pool: PgPool, tables: Arc<Tables>, translations: Arc<dyn TranslationSink>) -> Self {
        Self {
            pool,
            tables,
            translations,
        }
    }

    /// Get a single map, optionally with its marker count.
    pub async fn get(&self, id: i64, with_count: bool) -> Result<Map, DbError> {
        let id = positive_id("id", id)?;
        let sql = format!("SELECT maps.* FROM {} AS maps WHERE maps.id = $1", self.tables.maps);

        let mut map: Map = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound {
                resource: "map",
                id: id.to_string(),
            })?;

        if with_count {
            map.markers = Some(self.count_markers_of(&map).await?);
        }
        Ok(map)
    }

    /// Get the maps with the given ids, ascending by id. Unknown ids are skipped.
    pub async fn get_many(&self, ids: &IdList, with_count: bool) -> Result<Vec<Map>, DbError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT maps.* FROM {} AS maps WHERE maps.id = ANY($1) ORDER BY maps.id",
            self.tables.maps
        );
        let maps = sqlx::query_as(&sql)
            .bind(ids.as_slice())
            .fetch_all(&self.pool)
            .await?;

        self.with_counts(maps, with_count).await
    }

    /// List maps matching `filters`.
    pub async fn all(&self, filters: &FilterOptions, with_count: bool) -> Result<Vec<Map>, DbError> {
        let compiled = filters.compile(Scope::Maps);
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT maps.* FROM {} AS maps", self.tables.maps));
        compiled.push_where(&mut qb);
        compiled.push_order_and_paging(&mut qb);

        let maps = qb.build_query_as::<Map>().fetch_all(&self.pool).await?;
        self.with_counts(maps, with_count).await
    }

    /// Count maps matching `filters`. Ordering and paging are ignored.
    pub async fn count(&self, filters: &FilterOptions) -> Result<i64, DbError> {
        let compiled = filters.compile(Scope::Maps);
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT COUNT(*) FROM {} AS maps", self.tables.maps));
        compiled.push_count_where(&mut qb);

        Ok(qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?)
    }

    /// Number of markers a map shows.
    ///
    /// Maps flagged `filtersAllMarkers` show every marker. Otherwise the map
    /// shows its own markers plus those of the maps keyed in its filters.
    pub async fn count_markers(&self, id: i64) -> Result<i64, DbError> {
        let map = self.get(id, false).await?;
        self.count_markers_of(&map).await
    }

    async fn count_markers_of(&self, map: &Map) -> Result<i64, DbError> {
        if MapSettings::parse(&map.settings).filters_all_markers {
            let sql = format!("SELECT COUNT(*) FROM {}", self.tables.markers);
            return Ok(sqlx::query_scalar(&sql).fetch_one(&self.pool).await?);
        }

        let mut map_ids = filter_map_ids(&map.filters);
        map_ids.push(map.id);
        let map_ids = IdList::from(map_ids);

        let sql = format!(
            r#"
            SELECT COUNT(DISTINCT markers.id)
            FROM {markers} AS markers
            JOIN {rels} AS rels ON rels.object_id = markers.id AND rels.type_id = $1
            WHERE rels.map_id = ANY($2)
            "#,
            markers = self.tables.markers,
            rels = self.tables.rels,
        );
        Ok(sqlx::query_scalar(&sql)
            .bind(RelationType::MARKER.as_i16())
            .bind(map_ids.as_slice())
            .fetch_one(&self.pool)
            .await?)
    }

    async fn with_counts(&self, mut maps: Vec<Map>, with_count: bool) -> Result<Vec<Map>, DbError> {
        if with_count {
            for map in &mut maps {
                map.markers = Some(self.count_markers_of(map).await?);
            }
        }
        Ok(maps)
    }

    /// Insert a map, returning its id. `id` of `None` lets the sequence assign one.
    pub async fn add(&self, draft: &MapDraft, id: Option<i32>) -> Result<i32, DbError> {
        let row = [(id, draft.clone())];
        let id = self
            .insert(&row)
            .await?
            .into_iter()
            .next()
            .ok_or(DbError::EmptyBatch { resource: "maps" })?;

        register_map(self.translations.as_ref(), id, &draft.name);
        tracing::debug!(map_id = id, "map added");
        Ok(id)
    }

    /// Insert many maps in multi-row statements, returning the new ids in order.
    pub async fn add_bulk(&self, rows: &[(Option<i32>, MapDraft)]) -> Result<Vec<i32>, DbError> {
        if rows.is_empty() {
            return Err(DbError::EmptyBatch { resource: "maps" });
        }
        let ids = self.insert(rows).await?;
        tracing::debug!(count = ids.len(), "maps added");
        Ok(ids)
    }

    async fn insert(&self, rows: &[(Option<i32>, MapDraft)]) -> Result<Vec<i32>, DbError> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(rows.len());

        for chunk in rows.chunks(rows_per_statement(9)) {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO {} {INSERT_COLUMNS}", self.tables.maps));
            qb.push_values(chunk, |mut row, (id, draft)| {
                push_row_id(&mut row, *id);
                row.push_bind(&draft.name)
                    .push_bind(&draft.settings)
                    .push_bind(&draft.filters)
                    .push_bind(&draft.geojson)
                    .push_bind(&draft.created_by)
                    .push_bind(draft.created_on)
                    .push_bind(&draft.updated_by)
                    .push_bind(draft.updated_on);
            });
            qb.push(" RETURNING id");
            ids.extend(qb.build_query_scalar::<i32>().fetch_all(&mut *tx).await?);
        }

        if rows.iter().any(|(id, _)| id.is_some_and(|id| id > 0)) {
            sync_id_sequence(&mut *tx, &self.tables.maps).await?;
        }
        tx.commit().await?;
        Ok(ids)
    }

    /// Overwrite a map's content.
    ///
    /// Audit columns are written but do not count as a change on their own.
    pub async fn update(&self, draft: &MapDraft, id: i64) -> Result<UpdateOutcome, DbError> {
        let id = positive_id("id", id)?;
        let sql = format!(
            r#"
            WITH target AS (
                SELECT id FROM {maps} WHERE id = $1
            ),
            changed AS (
                UPDATE {maps}
                SET name = $2, settings = $3, filters = $4, geojson = $5,
                    updated_by = $6, updated_on = $7
                WHERE id = $1
                  AND (name, settings, filters, geojson)
                      IS DISTINCT FROM ($2::text, $3::text, $4::text, $5::text)
                RETURNING id
            )
            SELECT EXISTS(SELECT 1 FROM target), EXISTS(SELECT 1 FROM changed)
            "#,
            maps = self.tables.maps
        );

        let (found, changed): (bool, bool) = sqlx::query_as(&sql)
            .bind(id)
            .bind(&draft.name)
            .bind(&draft.settings)
            .bind(&draft.filters)
            .bind(&draft.geojson)
            .bind(&draft.updated_by)
            .bind(draft.updated_on)
            .fetch_one(&self.pool)
            .await?;

        let outcome = UpdateOutcome::from_flags(found, changed);
        if outcome.is_updated() {
            register_map(self.translations.as_ref(), id, &draft.name);
        }
        Ok(outcome)
    }

    /// Overwrite many maps with the same content.
    pub async fn update_bulk(&self, draft: &MapDraft, ids: &IdList) -> Result<BulkUpdate, DbError> {
        if ids.is_empty() {
            return Err(DbError::EmptyBatch { resource: "maps" });
        }
        let sql = format!(
            r#"
            WITH targets AS (
                SELECT id FROM {maps} WHERE id = ANY($1)
            ),
            changed AS (
                UPDATE {maps}
                SET name = $2, settings = $3, filters = $4, geojson = $5,
                    updated_by = $6, updated_on = $7
                WHERE id = ANY($1)
                  AND (name, settings, filters, geojson)
                      IS DISTINCT FROM ($2::text, $3::text, $4::text, $5::text)
                RETURNING id
            )
            SELECT
                (SELECT COUNT(*) FROM targets),
                COALESCE((SELECT ARRAY_AGG(id ORDER BY id) FROM changed), '{{}}')
            "#,
            maps = self.tables.maps
        );

        let (found, updated): (i64, Vec<i32>) = sqlx::query_as(&sql)
            .bind(ids.as_slice())
            .bind(&draft.name)
            .bind(&draft.settings)
            .bind(&draft.filters)
            .bind(&draft.geojson)
            .bind(&draft.updated_by)
            .bind(draft.updated_on)
            .fetch_one(&self.pool)
            .await?;

        for &id in &updated {
            register_map(self.translations.as_ref(), id, &draft.name);
        }
        Ok(BulkUpdate { found, updated })
    }

    /// Delete a map and its relationship rows. Returns the number of maps deleted.
    pub async fn delete(&self, id: i64) -> Result<u64, DbError> {
        let id = positive_id("id", id)?;
        self.delete_where(&[id]).await
    }

    /// Delete many maps and their relationship rows.
    pub async fn delete_bulk(&self, ids: &IdList) -> Result<u64, DbError> {
        if ids.is_empty() {
            return Err(DbError::EmptyBatch { resource: "maps" });
        }
        self.delete_where(ids.as_slice()).await
    }

    async fn delete_where(&self, ids: &[i32]) -> Result<u64, DbError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("DELETE FROM {} WHERE id = ANY($1)", self.tables.maps);
        let deleted = sqlx::query(&sql).bind(ids).execute(&mut *tx).await?.rows_affected();

        let sql = format!("DELETE FROM {} WHERE map_id = ANY($1)", self.tables.rels);
        let unlinked = sqlx::query(&sql).bind(ids).execute(&mut *tx).await?.rows_affected();

        tx.commit().await?;
        tracing::debug!(deleted, unlinked, "maps deleted");
        Ok(deleted)
    }
}
