//! Repository implementations for database access
//!
//! Each repository follows these patterns:
//! - Table names come from the validated [`Tables`], values are always bound
//! - Bulk writes are one multi-row statement per chunk, inside a transaction
//! - Entity deletes clean up relationship rows in the same transaction

pub mod layers;
pub mod maps;
pub mod markers;
pub mod relationships;

use std::fmt::Display;
use std::sync::Arc;

use sqlx::query_builder::Separated;
use sqlx::{PgConnection, PgPool, Postgres};

use crate::services::{Geocoder, TranslationSink};

pub use super::{DbError, Tables};
pub use layers::{Layer, LayerDraft, LayerRepo};
pub use maps::{Map, MapDraft, MapRepo};
pub use markers::{Marker, MarkerDraft, MarkerRepo};
pub use relationships::RelationshipRepo;

/// Postgres caps a statement at 65535 bind parameters.
const MAX_BIND_PARAMS: usize = 65_535;

/// Rows per multi-row statement for a table with `columns` bound columns.
pub(crate) fn rows_per_statement(columns: usize) -> usize {
    (MAX_BIND_PARAMS / columns).max(1)
}

/// Push an explicit id, or `DEFAULT` to let the sequence assign one.
pub(crate) fn push_row_id<'qb, 'args: 'qb, Sep: Display>(
    row: &mut Separated<'qb, 'args, Postgres, Sep>,
    id: Option<i32>,
) {
    match id.filter(|&id| id > 0) {
        Some(id) => {
            row.push_bind(id);
        }
        None => {
            row.push("DEFAULT");
        }
    }
}

/// Move a table's id sequence past its largest id after explicit-id inserts.
pub(crate) async fn sync_id_sequence(
    conn: &mut PgConnection,
    table: &str,
) -> Result<(), sqlx::Error> {
    let sql = format!(
        "SELECT setval(pg_get_serial_sequence('{table}', 'id'), \
         COALESCE((SELECT MAX(id) FROM {table}), 1))"
    );
    sqlx::query(&sql).execute(conn).await?;
    Ok(())
}

/// All repositories, built once and shared by reference-counted clones.
#[derive(Clone)]
pub struct Store {
    pub maps: MapRepo,
    pub markers: MarkerRepo,
    pub layers: LayerRepo,
    pub relationships: RelationshipRepo,
}

impl Store {
    pub fn new(
        pool: PgPool,
        tables: Tables,
        geocoder: Arc<dyn Geocoder>,
        translations: Arc<dyn TranslationSink>,
    ) -> Self {
        let tables = Arc::new(tables);
        Self {
            maps: MapRepo::new(pool.clone(), tables.clone(), translations.clone()),
            markers: MarkerRepo::new(pool.clone(), tables.clone(), geocoder, translations),
            layers: LayerRepo::new(pool.clone(), tables.clone()),
            relationships: RelationshipRepo::new(pool, tables),
        }
    }
}


/// Test fixtures: a store over throwaway tables with a unique prefix.
#[cfg(test)]
pub(crate) mod testing {
    use std::ops::Deref;
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::Utc;
    use sqlx::postgres::PgPoolOptions;

    use super::*;
    use crate::db::schema;
    use crate::services::{DisabledGeocoder, NoopTranslations};

    static NEXT_PREFIX: AtomicU32 = AtomicU32::new(0);

    pub(crate) struct TestStore {
        store: Store,
        pool: PgPool,
        tables: Tables,
    }

    impl Deref for TestStore {
        type Target = Store;

        fn deref(&self) -> &Store {
            &self.store
        }
    }

    impl TestStore {
        /// Store over a pool that never connects, for paths that must fail
        /// before any statement is sent.
        pub(crate) fn lazy() -> Self {
            Self::lazy_with(Arc::new(DisabledGeocoder), Arc::new(NoopTranslations))
        }

        pub(crate) fn lazy_with(geocoder: Arc<dyn Geocoder>, translations: Arc<dyn TranslationSink>) -> Self {
            let pool = PgPoolOptions::new()
                .connect_lazy("postgres://unused@localhost/unused")
                .expect("lazy pool");
            Self::build(pool, Tables::default(), geocoder, translations)
        }

        /// Connect to DATABASE_URL and create tables under a fresh prefix.
        pub(crate) async fn connect() -> Self {
            Self::connect_full(Arc::new(DisabledGeocoder), Arc::new(NoopTranslations)).await
        }

        pub(crate) async fn connect_with(translations: Arc<dyn TranslationSink>) -> Self {
            Self::connect_full(Arc::new(DisabledGeocoder), translations).await
        }

        pub(crate) async fn connect_full(
            geocoder: Arc<dyn Geocoder>,
            translations: Arc<dyn TranslationSink>,
        ) -> Self {
            let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
            let pool = PgPoolOptions::new()
                .max_connections(2)
                .connect(&url)
                .await
                .expect("connect");

            let prefix = format!(
                "t{}_{}_",
                std::process::id(),
                NEXT_PREFIX.fetch_add(1, Ordering::Relaxed)
            );
            let tables = Tables::with_prefix(&prefix).expect("prefix");
            schema::create_tables(&pool, &tables).await.expect("create tables");

            Self::build(pool, tables, geocoder, translations)
        }

        fn build(
            pool: PgPool,
            tables: Tables,
            geocoder: Arc<dyn Geocoder>,
            translations: Arc<dyn TranslationSink>,
        ) -> Self {
            Self {
                store: Store::new(pool.clone(), tables.clone(), geocoder, translations),
                pool,
                tables,
            }
        }

        pub(crate) async fn rel_count(&self, map_id: i32) -> i64 {
            let sql = format!("SELECT COUNT(*) FROM {} WHERE map_id = $1", self.tables.rels);
            sqlx::query_scalar(&sql)
                .bind(map_id)
                .fetch_one(&self.pool)
                .await
                .expect("count relationships")
        }

        /// Insert markers with ids `1..=n`.
        pub(crate) async fn seed_markers(&self, n: i32) {
            let rows: Vec<_> = (1..=n)
                .map(|id| (Some(id), marker_draft(&format!("seed {id}"), 0.0, 0.0)))
                .collect();
            self.markers.add_bulk(&rows).await.expect("seed markers");
        }

        pub(crate) async fn teardown(self) {
            schema::drop_tables(&self.pool, &self.tables)
                .await
                .expect("drop tables");
        }
    }

    pub(crate) fn map_draft(name: &str) -> MapDraft {
        let now = Utc::now();
        MapDraft {
            name: name.to_owned(),
            settings: "{}".to_owned(),
            filters: "{}".to_owned(),
            geojson: String::new(),
            created_by: "admin".to_owned(),
            created_on: now,
            updated_by: "admin".to_owned(),
            updated_on: now,
        }
    }

    pub(crate) fn marker_draft(name: &str, lat: f64, lng: f64) -> MarkerDraft {
        let now = Utc::now();
        MarkerDraft {
            name: name.to_owned(),
            address: String::new(),
            lat,
            lng,
            zoom: 11.0,
            icon: String::new(),
            popup: String::new(),
            link: String::new(),
            blank: false,
            created_by: "admin".to_owned(),
            created_on: now,
            updated_by: "admin".to_owned(),
            updated_on: now,
        }
    }

    pub(crate) fn layer_draft(name: &str, overlay: bool) -> LayerDraft {
        LayerDraft {
            wms: false,
            overlay,
            name: name.to_owned(),
            url: "https://tile.example.org/{z}/{x}/{y}.png".to_owned(),
            options: "{}".to_owned(),
        }
    }
}
