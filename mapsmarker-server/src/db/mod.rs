//! Database layer - connection pool, schema and repositories
//!
//! # Design Principles
//!
//! - Connection pool, no Arc<Mutex<Connection>>
//! - Every value is a bound parameter, including bulk writes
//! - Rely on the unique key for relationship dedup, no check-then-insert
//! - Entity delete and relationship cleanup share one transaction

pub mod error;
pub mod pool;
pub mod repos;
pub mod schema;
pub mod tables;

pub use error::DbError;
pub use pool::{create_pool, create_pool_with_options, PoolSettings};
pub use repos::*;
pub use tables::Tables;
