//! Map endpoints

use std::sync::Arc;

use axum::extract::State;
use axum::{routing::get, Json, Router};

use super::Listing;
use crate::db::{Map, Marker};
use crate::http::error::ApiError;
use crate::http::extractors::{Filters, ValidId};
use crate::http::server::AppState;

/// GET /maps - maps matching the query filters, with marker counts
async fn list_maps(
    State(state): State<Arc<AppState>>,
    Filters(filters): Filters,
) -> Result<Json<Listing<Map>>, ApiError> {
    let total = state.store.maps.count(&filters).await?;
    let items = state.store.maps.all(&filters, true).await?;
    Ok(Json(Listing { items, total }))
}

/// GET /maps/{id}
async fn get_map(
    State(state): State<Arc<AppState>>,
    ValidId(id): ValidId,
) -> Result<Json<Map>, ApiError> {
    Ok(Json(state.store.maps.get(id, true).await?))
}

/// GET /maps/{id}/markers - markers assigned to the map
async fn map_markers(
    State(state): State<Arc<AppState>>,
    ValidId(id): ValidId,
) -> Result<Json<Listing<Marker>>, ApiError> {
    // 404 for unknown maps rather than an empty list
    state.store.maps.get(id, false).await?;

    let items = state.store.markers.for_map(id).await?;
    Ok(Json(Listing::complete(items)))
}

/// Map routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/maps", get(list_maps))
        .route("/maps/{id}", get(get_map))
        .route("/maps/{id}/markers", get(map_markers))
}
