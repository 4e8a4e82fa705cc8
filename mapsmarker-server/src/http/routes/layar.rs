//! Layar feed endpoint
//!
//! Always answers 200 with a JSON body; feed errors travel in `errorCode`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONTENT_TYPE, EXPIRES};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Router};

use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::layar::{LayarError, LayarRequest, LayarResponse};

/// GET /layar
async fn feed(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let settings = &state.layar;

    let body = match LayarRequest::parse(&params, settings) {
        Err(err) => err.into_body(),
        Ok(request) => match state.store.markers.all(&request.filters(settings)).await {
            Ok(markers) => LayarResponse::build(&request, &markers, settings)
                .unwrap_or_else(LayarError::into_body),
            Err(err) => return ApiError::from(err).into_response(),
        },
    };

    tracing::debug!(layer = ?body.layer, code = body.error_code, hotspots = body.hotspots.len(), "layar feed");
    feed_response(&body)
}

/// Pretty-printed JSON with the feed's cache and origin headers.
pub(crate) fn feed_response(body: &LayarResponse) -> Response {
    match serde_json::to_string_pretty(body) {
        Ok(json) => (
            [
                (ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
                (CACHE_CONTROL, "no-cache, must-revalidate"),
                (EXPIRES, "Mon, 26 Jul 1997 05:00:00 GMT"),
                (CONTENT_TYPE, "application/json; charset=utf-8"),
            ],
            json,
        )
            .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "failed to serialize layar response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Layar routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/layar", get(feed))
}
