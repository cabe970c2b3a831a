use axum::extract::{Path, State};
use axum::Json;
use scholarly_rate_limit::RateLimitStats;
use serde_json::{json, Value};

use crate::state::SharedState;

/// GET /api/rate-limit/{identifier}
pub async fn get_stats(
    State(state): State<SharedState>,
    Path(identifier): Path<String>,
) -> Json<RateLimitStats> {
    Json(state.rate_limiter.get_stats(&identifier))
}

/// DELETE /api/rate-limit/{identifier}
pub async fn reset_identifier(
    State(state): State<SharedState>,
    Path(identifier): Path<String>,
) -> Json<Value> {
    state.rate_limiter.reset(Some(&identifier));
    Json(json!({ "status": "reset", "identifier": identifier }))
}

/// DELETE /api/rate-limit
pub async fn reset_all(State(state): State<SharedState>) -> Json<Value> {
    state.rate_limiter.reset(None);
    Json(json!({ "status": "reset" }))
}
