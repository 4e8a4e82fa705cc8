//! Database connection pool management
//!
//! One pool is shared by every repository of a [`Store`](super::Store).
//! Size and timeouts come from the `[database]` config section.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Default maximum connections for the pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Default wait for a free connection before a query fails.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Pool sizing and timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// Close connections idle this long; `None` keeps them open.
    pub idle_timeout: Option<Duration>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            idle_timeout: Some(Duration::from_secs(600)),
        }
    }
}

impl PoolSettings {
    /// sqlx options for these settings. A zero connection cap is raised to 1.
    pub fn options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections.max(1))
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
    }
}

/// Create a PostgreSQL connection pool with default settings.
///
/// ```ignore
/// let pool = create_pool("postgres://localhost/mapsmarker").await?;
/// ```
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    create_pool_with_options(database_url, &PoolSettings::default()).await
}

/// Create a PostgreSQL connection pool, connecting once up front so a bad
/// URL fails here instead of on the first query.
pub async fn create_pool_with_options(
    database_url: &str,
    settings: &PoolSettings,
) -> Result<PgPool, sqlx::Error> {
    let pool = settings.options().connect(database_url).await?;
    tracing::debug!(
        max_connections = settings.max_connections,
        acquire_timeout_ms = settings.acquire_timeout.as_millis() as u64,
        "database pool ready"
    );
    Ok(pool)
}
