//! Schema management for the store tables
//!
//! Creation is idempotent (`IF NOT EXISTS`); reset is drop followed by
//! create. Upgrades are idempotent column changes applied on every start.

use sqlx::PgPool;

use super::{DbError, Tables};

/// Statements creating all tables and indexes.
pub fn create_statements(tables: &Tables) -> Vec<String> {
    let Tables {
        layers,
        maps,
        markers,
        rels,
    } = tables;

    vec![
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {layers} (
                id SERIAL PRIMARY KEY,
                wms BOOLEAN NOT NULL DEFAULT FALSE,
                overlay BOOLEAN NOT NULL DEFAULT FALSE,
                name VARCHAR(255) NOT NULL,
                url VARCHAR(2048) NOT NULL,
                options TEXT NOT NULL DEFAULT '{{}}'
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {maps} (
                id SERIAL PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                settings TEXT NOT NULL DEFAULT '{{}}',
                filters TEXT NOT NULL DEFAULT '{{}}',
                geojson TEXT NOT NULL DEFAULT '',
                created_by VARCHAR(255) NOT NULL,
                created_on TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_by VARCHAR(255) NOT NULL,
                updated_on TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {markers} (
                id SERIAL PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                address VARCHAR(255) NOT NULL,
                lat DOUBLE PRECISION NOT NULL,
                lng DOUBLE PRECISION NOT NULL,
                zoom DOUBLE PRECISION NOT NULL,
                icon VARCHAR(255) NOT NULL,
                popup TEXT NOT NULL,
                link VARCHAR(255) NOT NULL,
                blank BOOLEAN NOT NULL DEFAULT FALSE,
                created_by VARCHAR(255) NOT NULL,
                created_on TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_by VARCHAR(255) NOT NULL,
                updated_on TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {rels} (
                map_id INTEGER NOT NULL,
                type_id SMALLINT NOT NULL,
                object_id INTEGER NOT NULL,
                CONSTRAINT {rels}_key UNIQUE (map_id, type_id, object_id)
            )
            "#
        ),
        format!("CREATE INDEX IF NOT EXISTS {rels}_map_id ON {rels}(map_id)"),
        format!("CREATE INDEX IF NOT EXISTS {rels}_type_id ON {rels}(type_id)"),
        format!("CREATE INDEX IF NOT EXISTS {rels}_object_id ON {rels}(object_id)"),
    ]
}

/// Statements bringing tables created by older releases up to date.
pub fn upgrade_statements(tables: &Tables) -> Vec<String> {
    vec![
        format!("ALTER TABLE {} ALTER COLUMN url TYPE VARCHAR(2048)", tables.layers),
        format!(
            "ALTER TABLE {} ADD COLUMN IF NOT EXISTS geojson TEXT NOT NULL DEFAULT ''",
            tables.maps
        ),
        format!(
            "ALTER TABLE {} ADD COLUMN IF NOT EXISTS blank BOOLEAN NOT NULL DEFAULT FALSE",
            tables.markers
        ),
    ]
}

/// Create all tables and indexes if missing.
pub async fn create_tables(pool: &PgPool, tables: &Tables) -> Result<(), DbError> {
    for statement in create_statements(tables) {
        sqlx::query(&statement).execute(pool).await?;
    }
    tracing::info!(maps = %tables.maps, "store tables ensured");
    Ok(())
}

/// Apply idempotent upgrades to existing tables.
pub async fn upgrade_tables(pool: &PgPool, tables: &Tables) -> Result<(), DbError> {
    for statement in upgrade_statements(tables) {
        sqlx::query(&statement).execute(pool).await?;
    }
    tracing::debug!("store table upgrades applied");
    Ok(())
}

/// Drop all store tables.
pub async fn drop_tables(pool: &PgPool, tables: &Tables) -> Result<(), DbError> {
    for table in tables.all() {
        sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
            .execute(pool)
            .await?;
    }
    tracing::warn!(maps = %tables.maps, "store tables dropped");
    Ok(())
}

/// Drop and recreate all store tables.
pub async fn reset_tables(pool: &PgPool, tables: &Tables) -> Result<(), DbError> {
    drop_tables(pool, tables).await?;
    create_tables(pool, tables).await
}

/// Create missing tables, then apply upgrades. Run on server start.
pub async fn migrate(pool: &PgPool, tables: &Tables) -> Result<(), DbError> {
    tracing::info!("Running store migrations...");
    create_tables(pool, tables).await?;
    upgrade_tables(pool, tables).await?;
    tracing::info!("Store migrations complete");
    Ok(())
}
