use std::sync::LazyLock;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::Response,
};

use super::intercepted_response;
use crate::auction::NewBid;
use crate::cache::{CacheInvalidate, CachePolicy, CachedPayload, RequestContext};
use crate::error::ApiError;
use crate::lock::LockKind;
use crate::server::AppState;

/// An accepted bid makes the cached item stale.
static PLACE_BID: LazyLock<CachePolicy> = LazyLock::new(|| {
    CacheInvalidate::new(|ctx| {
        ctx.data
            .and_then(|payload| match payload {
                CachedPayload::Json(item) => item.get("id")?.as_str().map(str::to_owned),
                _ => None,
            })
            .into_iter()
            .collect()
    })
    .into()
});

pub async fn bid_no_lock(
    State(state): State<AppState>,
    request: RequestContext,
    Json(bid): Json<NewBid>,
) -> Result<Response, ApiError> {
    place_bid(state, request, bid, LockKind::None).await
}

pub async fn bid_spin_lock(
    State(state): State<AppState>,
    request: RequestContext,
    Json(bid): Json<NewBid>,
) -> Result<Response, ApiError> {
    place_bid(state, request, bid, LockKind::Spin).await
}

pub async fn bid_quorum_lock(
    State(state): State<AppState>,
    request: RequestContext,
    Json(bid): Json<NewBid>,
) -> Result<Response, ApiError> {
    place_bid(state, request, bid, LockKind::Quorum).await
}

async fn place_bid(
    state: AppState,
    request: RequestContext,
    bid: NewBid,
    kind: LockKind,
) -> Result<Response, ApiError> {
    if !bid.price.is_finite() || bid.price <= 0.0 {
        return Err(ApiError::BadRequest("bid price must be a positive number".into()));
    }
    let out = state
        .interceptor
        .intercept(&request, &PLACE_BID, || async {
            let item = state.auction.place_bid(&bid, kind).await?;
            Ok::<_, ApiError>(CachedPayload::json(&item)?)
        })
        .await?;
    Ok(intercepted_response(StatusCode::OK, out))
}
