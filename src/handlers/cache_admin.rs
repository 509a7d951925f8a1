use crate::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use super::ApiResponse;

/// POST /api/cache/clear
pub async fn clear(State(state): State<Arc<AppState>>) -> Json<ApiResponse<bool>> {
    state.service.clear_caches();
    Json(ApiResponse::success(true, "Cache cleared successfully"))
}

/// GET /api/cache/keys
pub async fn keys(State(state): State<Arc<AppState>>) -> Json<ApiResponse<Vec<String>>> {
    let keys = state.service.cache_keys();
    let message = format!("Found {} cached item(s)", keys.len());
    Json(ApiResponse::success(keys, message))
}

/// DELETE /api/cache/keys/:key
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Json<ApiResponse<bool>> {
    let removed = state.service.remove_cache_key(&key);
    let message = if removed {
        format!("Cache key '{key}' removed successfully")
    } else {
        format!("Cache key '{key}' was not present")
    };
    Json(ApiResponse::success(removed, message))
}
