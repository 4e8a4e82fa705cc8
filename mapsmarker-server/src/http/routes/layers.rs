//! Layer endpoints

use std::sync::Arc;

use axum::extract::State;
use axum::{routing::get, Json, Router};

use super::Listing;
use crate::db::Layer;
use crate::http::error::ApiError;
use crate::http::extractors::Filters;
use crate::http::server::AppState;

/// GET /layers
async fn list_layers(
    State(state): State<Arc<AppState>>,
    Filters(filters): Filters,
) -> Result<Json<Listing<Layer>>, ApiError> {
    let items = state.store.layers.all(&filters).await?;
    Ok(Json(Listing::complete(items)))
}

/// Layer routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/layers", get(list_layers))
}
