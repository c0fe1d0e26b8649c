use std::sync::LazyLock;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};

use super::intercepted_response;
use crate::auction::NewItem;
use crate::cache::{CacheInvalidate, CachePolicy, CachePopulate, CachedPayload, RequestContext};
use crate::error::ApiError;
use crate::server::AppState;

/// Bucket shared by every item entry.
pub const ITEMS_BUCKET: &str = "items";

/// `GET /items/{id}`: cached under the item id and the shared bucket.
static READ_ITEM: LazyLock<CachePolicy> = LazyLock::new(|| {
    CachePopulate::new(|ctx| {
        let id = ctx.request.param("id").unwrap_or_default();
        vec![id.to_owned(), ITEMS_BUCKET.to_owned()]
    })
    .unique_suffix(|ctx| ctx.request.param("id").unwrap_or_default().to_owned())
    .into()
});

/// `POST /items`: drops everything item related.
static CREATE_ITEM: LazyLock<CachePolicy> =
    LazyLock::new(|| CacheInvalidate::new(|_| vec![ITEMS_BUCKET.to_owned()]).into());

pub async fn create_item(
    State(state): State<AppState>,
    request: RequestContext,
    Json(new_item): Json<NewItem>,
) -> Result<Response, ApiError> {
    if new_item.name.trim().is_empty() {
        return Err(ApiError::BadRequest("item name must not be empty".into()));
    }
    if !new_item.price.is_finite() || new_item.price < 0.0 {
        return Err(ApiError::BadRequest(
            "starting price must be a non-negative number".into(),
        ));
    }
    let out = state
        .interceptor
        .intercept(&request, &CREATE_ITEM, || async {
            let item = state.auction.create_item(new_item).await?;
            Ok::<_, ApiError>(CachedPayload::json(&item)?)
        })
        .await?;
    Ok(intercepted_response(StatusCode::CREATED, out))
}

pub async fn read_item(
    State(state): State<AppState>,
    request: RequestContext,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let out = state
        .interceptor
        .intercept(&request, &READ_ITEM, || async {
            let item = state
                .auction
                .get_item(&id)
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("Item '{id}' does not exist")))?;
            Ok::<_, ApiError>(CachedPayload::json(&item)?)
        })
        .await?;
    Ok(intercepted_response(StatusCode::OK, out))
}
