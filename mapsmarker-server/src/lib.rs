//! mapsmarker-server: relational store for maps, markers and layers
//!
//! Repositories over Postgres, a filter compiler that turns loose option
//! maps into bound SQL, and an HTTP read API including the Layar feed.

pub mod db;
pub mod filters;
pub mod http;
pub mod layar;
pub mod models;
pub mod services;

pub use db::{create_pool, create_pool_with_options, DbError, PoolSettings, Store, Tables};
pub use filters::FilterOptions;
pub use http::{run_server, AppState, ServerConfig};
pub use layar::LayarSettings;
