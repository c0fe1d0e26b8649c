//! Response caching with bucket-based invalidation.
//!
//! ## Architecture
//!
//! ```text
//! request ─► CacheInterceptor ─► CachePolicy::resolve
//!                 │
//!                 ├─ enabled:  CacheService::get_cache ─► hit? return
//!                 │            handler ─► set_buckets + set_payload
//!                 └─ disabled: handler ─► invalidate_buckets (if Invalidate)
//! ```
//!
//! Entries are addressed by a data key derived from the request (see
//! [`keys`]). Buckets are sets of data keys that can be dropped together.
//! Binary entries are one level deeper: the data key holds a set of buffer
//! sub-keys, so bucket invalidation cascades two levels for them.

mod circuit;
mod interceptor;
pub mod keys;
mod payload;
mod policy;
mod service;

use std::time::Duration;

use gavel_storage::StoreError;

pub use circuit::{CircuitState, FailureCircuit};
pub use interceptor::{CacheInterceptor, CacheStatus, Intercepted};
pub use keys::{CacheKeyParams, Traffic, build_cache_data_key};
pub use payload::CachedPayload;
pub use policy::{
    BucketContext, CacheInvalidate, CachePolicy, CachePopulate, RequestContext, ResolvedPolicy,
    UniqueSuffix,
};
pub use service::{CacheService, CacheSettings};

/// Cache-layer failure. Always recoverable: callers proceed without cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache service is offline")]
    CircuitOpen,

    #[error("cache read timed out after {0:?}")]
    Timeout(Duration),

    #[error("cache store error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to decode cached entry '{key}': {message}")]
    Decode { key: String, message: String },

    #[error("failed to encode cache entry '{key}': {message}")]
    Encode { key: String, message: String },
}

impl CacheError {
    pub fn decode(key: &str, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            key: key.to_owned(),
            message: err.to_string(),
        }
    }

    pub fn encode(key: &str, err: impl std::fmt::Display) -> Self {
        Self::Encode {
            key: key.to_owned(),
            message: err.to_string(),
        }
    }
}
