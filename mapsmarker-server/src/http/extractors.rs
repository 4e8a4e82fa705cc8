//! Custom Axum extractors

use axum::extract::{FromRequestParts, Path, Query};
use axum::http::request::Parts;

use super::error::ApiError;
use crate::filters::FilterOptions;
use crate::models::{positive_id, ValidationError};

/// Extract and validate a positive integer id from the path
pub struct ValidId(pub i64);

impl<S> FromRequestParts<S> for ValidId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw): Path<String> = Path::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::Validation(ValidationError::Empty { field: "id" }))?;

        let value = raw.parse::<i64>().map_err(|_| {
            ApiError::Validation(ValidationError::InvalidFormat {
                field: "id",
                reason: "not an integer",
            })
        })?;
        positive_id("id", value)?;

        Ok(Self(value))
    }
}

/// Filter options from the query string
pub struct Filters(pub FilterOptions);

impl<S> FromRequestParts<S> for Filters
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(options) = Query::<FilterOptions>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| {
                tracing::debug!(error = %rejection, "unparsable filter query");
                ApiError::Validation(ValidationError::InvalidFormat {
                    field: "query",
                    reason: "unparsable filter options",
                })
            })?;
        Ok(Self(options))
    }
}
