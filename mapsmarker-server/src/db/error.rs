//! Database error type

use crate::models::ValidationError;
use crate::services::GeocodeError;

/// Errors from repositories and schema management
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("not found: {resource} '{id}'")]
    NotFound { resource: &'static str, id: String },

    #[error("empty batch: no {resource} to write")]
    EmptyBatch { resource: &'static str },

    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("an address is required to geocode a marker")]
    MissingAddress,

    #[error("geocoding failed: {0}")]
    Geocoding(#[from] GeocodeError),
}
