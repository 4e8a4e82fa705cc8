//! Layer repository - basemaps and overlays

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use super::{push_row_id, rows_per_statement, sync_id_sequence, DbError, Tables};
use crate::filters::{FilterOptions, Scope};
use crate::models::{positive_id, BulkUpdate, IdList, UpdateOutcome};

/// Tile layer record from database
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Layer {
    pub id: i32,
    pub wms: bool,
    pub overlay: bool,
    pub name: String,
    pub url: String,
    pub options: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LayerDraft {
    #[serde(default)]
    pub wms: bool,
    #[serde(default)]
    pub overlay: bool,
    pub name: String,
    pub url: String,
    #[serde(default = "default_options")]
    pub options: String,
}

fn default_options() -> String {
    "{}".to_owned()
}

/// Layer repository
#[derive(Clone)]
pub struct LayerRepo {
    pool: PgPool,
    tables: Arc<Tables>,
}

impl LayerRepo {
    pub fn new(pool: PgPool, tables: Arc<Tables>) -> Self {
        Self { pool, tables }
    }

    pub async fn get(&self, id: i64) -> Result<Layer, DbError> {
        let id = positive_id("id", id)?;
        let sql = format!("SELECT layers.* FROM {} AS layers WHERE layers.id = $1", self.tables.layers);

        sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound {
                resource: "layer",
                id: id.to_string(),
            })
    }

    pub async fn get_many(&self, ids: &IdList) -> Result<Vec<Layer>, DbError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT layers.* FROM {} AS layers WHERE layers.id = ANY($1) ORDER BY layers.id",
            self.tables.layers
        );
        Ok(sqlx::query_as(&sql).bind(ids.as_slice()).fetch_all(&self.pool).await?)
    }

    pub async fn all(&self, filters: &FilterOptions) -> Result<Vec<Layer>, DbError> {
        let compiled = filters.compile(Scope::Layers);
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT layers.* FROM {} AS layers", self.tables.layers));
        compiled.push_where(&mut qb);
        compiled.push_order_and_paging(&mut qb);

        Ok(qb.build_query_as::<Layer>().fetch_all(&self.pool).await?)
    }

    /// Layers usable as a map's base tiles.
    pub async fn basemaps(&self) -> Result<Vec<Layer>, DbError> {
        self.by_overlay(false).await
    }

    /// Layers drawn on top of a basemap.
    pub async fn overlays(&self) -> Result<Vec<Layer>, DbError> {
        self.by_overlay(true).await
    }

    async fn by_overlay(&self, overlay: bool) -> Result<Vec<Layer>, DbError> {
        let sql = format!(
            "SELECT layers.* FROM {} AS layers WHERE layers.overlay = $1 ORDER BY layers.id",
            self.tables.layers
        );
        Ok(sqlx::query_as(&sql).bind(overlay).fetch_all(&self.pool).await?)
    }

    pub async fn add(&self, draft: &LayerDraft, id: Option<i32>) -> Result<i32, DbError> {
        let row = [(id, draft.clone())];
        self.insert(&row)
            .await?
            .into_iter()
            .next()
            .ok_or(DbError::EmptyBatch { resource: "layers" })
    }

    pub async fn add_bulk(&self, rows: &[(Option<i32>, LayerDraft)]) -> Result<Vec<i32>, DbError> {
        if rows.is_empty() {
            return Err(DbError::EmptyBatch { resource: "layers" });
        }
        self.insert(rows).await
    }

    async fn insert(&self, rows: &[(Option<i32>, LayerDraft)]) -> Result<Vec<i32>, DbError> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(rows.len());

        for chunk in rows.chunks(rows_per_statement(6)) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO {} (id, wms, overlay, name, url, options) ",
                self.tables.layers
            ));
            qb.push_values(chunk, |mut row, (id, draft)| {
                push_row_id(&mut row, *id);
                row.push_bind(draft.wms)
                    .push_bind(draft.overlay)
                    .push_bind(&draft.name)
                    .push_bind(&draft.url)
                    .push_bind(&draft.options);
            });
            qb.push(" RETURNING id");
            ids.extend(qb.build_query_scalar::<i32>().fetch_all(&mut *tx).await?);
        }

        if rows.iter().any(|(id, _)| id.is_some_and(|id| id > 0)) {
            sync_id_sequence(&mut *tx, &self.tables.layers).await?;
        }
        tx.commit().await?;
        Ok(ids)
    }

    async fn overwrite(&self, ids: &[i32], draft: &LayerDraft) -> Result<BulkUpdate, DbError> {
        let sql = format!(
            r#"
            WITH targets AS (
                SELECT id FROM {layers} WHERE id = ANY($1)
            ),
            changed AS (
                UPDATE {layers}
                SET wms = $2, overlay = $3, name = $4, url = $5, options = $6
                WHERE id = ANY($1)
                  AND (wms, overlay, name, url, options)
                      IS DISTINCT FROM ($2::boolean, $3::boolean, $4::text, $5::text, $6::text)
                RETURNING id
            )
            SELECT
                (SELECT COUNT(*) FROM targets),
                COALESCE((SELECT ARRAY_AGG(id ORDER BY id) FROM changed), '{{}}')
            "#,
            layers = self.tables.layers
        );

        let (found, updated): (i64, Vec<i32>) = sqlx::query_as(&sql)
            .bind(ids)
            .bind(draft.wms)
            .bind(draft.overlay)
            .bind(&draft.name)
            .bind(&draft.url)
            .bind(&draft.options)
            .fetch_one(&self.pool)
            .await?;
        Ok(BulkUpdate { found, updated })
    }

    pub async fn update(&self, draft: &LayerDraft, id: i64) -> Result<UpdateOutcome, DbError> {
        let id = positive_id("id", id)?;
        let result = self.overwrite(&[id], draft).await?;
        Ok(UpdateOutcome::from_flags(result.found > 0, !result.updated.is_empty()))
    }

    pub async fn update_bulk(&self, draft: &LayerDraft, ids: &IdList) -> Result<BulkUpdate, DbError> {
        if ids.is_empty() {
            return Err(DbError::EmptyBatch { resource: "layers" });
        }
        self.overwrite(ids.as_slice(), draft).await
    }

    pub async fn delete(&self, id: i64) -> Result<u64, DbError> {
        let id = positive_id("id", id)?;
        self.delete_where(&[id]).await
    }

    pub async fn delete_bulk(&self, ids: &IdList) -> Result<u64, DbError> {
        if ids.is_empty() {
            return Err(DbError::EmptyBatch { resource: "layers" });
        }
        self.delete_where(ids.as_slice()).await
    }

    async fn delete_where(&self, ids: &[i32]) -> Result<u64, DbError> {
        let sql = format!("DELETE FROM {} WHERE id = ANY($1)", self.tables.layers);
        let deleted = sqlx::query(&sql).bind(ids).execute(&self.pool).await?.rows_affected();
        tracing::debug!(deleted, "layers deleted");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{layer_draft, TestStore};
    use super::*;

    #[tokio::test]
    async fn empty_batches_are_rejected() {
        let store = TestStore::lazy();
        assert!(matches!(
            store.layers.add_bulk(&[]).await,
            Err(DbError::EmptyBatch { resource: "layers" })
        ));
        assert!(matches!(
            store.layers.update_bulk(&layer_draft("x", false), &IdList::default()).await,
            Err(DbError::EmptyBatch { .. })
        ));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn basemaps_and_overlays_are_split() {
        let store = TestStore::connect().await;

        let ids = store
            .layers
            .add_bulk(&[
                (None, layer_draft("OSM", false)),
                (None, layer_draft("Rails", true)),
                (None, layer_draft("Topo", false)),
            ])
            .await
            .unwrap();

        let basemaps: Vec<_> = store.layers.basemaps().await.unwrap().into_iter().map(|l| l.id).collect();
        let overlays: Vec<_> = store.layers.overlays().await.unwrap().into_iter().map(|l| l.id).collect();
        assert_eq!(basemaps, vec![ids[0], ids[2]]);
        assert_eq!(overlays, vec![ids[1]]);

        store.teardown().await;
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn bulk_update_reports_unchanged_rows() {
        let store = TestStore::connect().await;

        let a = store.layers.add(&layer_draft("OSM", false), None).await.unwrap();
        let b = store.layers.add(&layer_draft("Topo", false), None).await.unwrap();

        let result = store
            .layers
            .update_bulk(&layer_draft("OSM", false), &IdList::from(vec![a, b, 999]))
            .await
            .unwrap();
        assert_eq!(result.found, 2);
        assert_eq!(result.updated, vec![b]);
        assert_eq!(result.unchanged(), 1);
        assert_eq!(result.missing(3), 1);

        store.teardown().await;
    }
}
