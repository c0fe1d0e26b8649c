//! HTTP routes.

pub mod bids;
pub mod buckets;
pub mod items;

use std::collections::HashMap;
use std::convert::Infallible;

use axum::{
    Json,
    extract::{FromRequestParts, Path},
    http::{HeaderValue, StatusCode, header::HOST, request::Parts},
    response::{IntoResponse, Response},
};
use url::form_urlencoded;

use crate::cache::{Intercepted, RequestContext};

/// Response header carrying the [`CacheStatus`](crate::cache::CacheStatus).
pub const CACHE_STATUS_HEADER: &str = "cache-status";

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let host = parts
            .headers
            .get(HOST)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("localhost")
            .to_owned();
        let query = parts
            .uri
            .query()
            .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        let params = Path::<HashMap<String, String>>::from_request_parts(parts, state)
            .await
            .map(|Path(params)| params)
            .unwrap_or_default();

        Ok(RequestContext {
            host,
            method: parts.method.as_str().to_owned(),
            path: parts.uri.path().to_owned(),
            query,
            params,
        })
    }
}

/// JSON response for an intercepted handler, tagged with its cache status.
pub(crate) fn intercepted_response(status: StatusCode, out: Intercepted) -> Response {
    let mut response = (status, Json(out.payload.to_json())).into_response();
    response.headers_mut().insert(
        CACHE_STATUS_HEADER,
        HeaderValue::from_static(out.status.as_str()),
    );
    response
}
