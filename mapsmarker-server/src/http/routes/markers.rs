//! Marker endpoints

use std::sync::Arc;

use axum::extract::State;
use axum::{routing::get, Json, Router};

use super::Listing;
use crate::db::Marker;
use crate::http::error::ApiError;
use crate::http::extractors::{Filters, ValidId};
use crate::http::server::AppState;

/// GET /markers - markers matching the query filters
///
/// `total` ignores `limit`/`offset`, so clients can page through results.
async fn list_markers(
    State(state): State<Arc<AppState>>,
    Filters(filters): Filters,
) -> Result<Json<Listing<Marker>>, ApiError> {
    let total = state.store.markers.count(&filters).await?;
    let items = state.store.markers.all(&filters).await?;
    Ok(Json(Listing { items, total }))
}

/// GET /markers/{id}
async fn get_marker(
    State(state): State<Arc<AppState>>,
    ValidId(id): ValidId,
) -> Result<Json<Marker>, ApiError> {
    Ok(Json(state.store.markers.get(id).await?))
}

/// Marker routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/markers", get(list_markers))
        .route("/markers/{id}", get(get_marker))
}
