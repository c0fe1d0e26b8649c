use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;

use crate::error::ApiError;
use crate::server::AppState;

/// `GET /bucket`: names of all live buckets.
pub async fn list_buckets(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let mut buckets = state.cache.get_all_bucket_ids().await?;
    buckets.sort();
    Ok(Json(json!({ "buckets": buckets })))
}

/// `DELETE /bucket/{ids}`: drops the comma-separated buckets and their JSON
/// entries.
pub async fn delete_buckets(
    State(state): State<AppState>,
    Path(ids): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let buckets: Vec<String> = ids
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
        .collect();
    if buckets.is_empty() {
        return Err(ApiError::BadRequest("no bucket ids given".into()));
    }

    let removed = state.cache.invalidate_buckets(&buckets).await;
    tracing::info!(buckets = ?buckets, removed, "buckets invalidated");
    Ok(Json(json!({ "buckets": buckets, "removed": removed })))
}
