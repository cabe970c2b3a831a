use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::SharedState;

/// DELETE /api/cache
///
/// Drops every cached entry. A backend that cannot be reached answers 503;
/// the cache itself keeps serving misses.
pub async fn clear_cache(State(state): State<SharedState>) -> impl IntoResponse {
    let backend = state.cache.backend_type();

    if state.cache.clear().await {
        tracing::info!(backend = %backend, "cache cleared via admin API");
        (
            StatusCode::OK,
            Json(json!({ "status": "cleared", "backend": backend })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "error",
                "message": format!("{} cache backend did not acknowledge clear", backend)
            })),
        )
    }
}
