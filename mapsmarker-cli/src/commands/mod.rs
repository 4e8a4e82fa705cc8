//! Command implementations for the mapsmarker CLI

pub mod import;
pub mod schema;
pub mod serve;
pub mod stats;

// Re-export main dispatcher functions for flat access from main.rs
pub use import::run_import;
pub use schema::run_schema;
pub use serve::run_serve;
pub use stats::run_stats;
