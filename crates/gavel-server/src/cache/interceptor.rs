use std::future::Future;
use std::sync::Arc;

use super::payload::CachedPayload;
use super::policy::{BucketContext, CachePolicy, RequestContext};
use super::service::CacheService;

/// Outcome of the cache lookup for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    /// Caching was disabled for the operation.
    Bypass,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
            CacheStatus::Bypass => "BYPASS",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Intercepted {
    pub payload: CachedPayload,
    pub status: CacheStatus,
}

/// Runs handlers behind a [`CachePolicy`].
///
/// Cache failures never reach the caller: a failed read is a miss and a
/// failed write is logged. Handler errors are returned untouched and skip
/// both write-back and invalidation.
#[derive(Clone)]
pub struct CacheInterceptor {
    cache: Arc<CacheService>,
}

impl CacheInterceptor {
    pub fn new(cache: Arc<CacheService>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &CacheService {
        &self.cache
    }

    pub async fn intercept<F, Fut, E>(
        &self,
        request: &RequestContext,
        policy: &CachePolicy,
        handler: F,
    ) -> Result<Intercepted, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedPayload, E>>,
    {
        let resolved = policy.resolve(&request.method, self.cache.settings());

        let populate = match policy {
            CachePolicy::Invalidate(invalidate) => {
                let payload = handler().await?;
                let buckets = invalidate.select_buckets(&BucketContext {
                    request,
                    data: Some(&payload),
                });
                if !buckets.is_empty() {
                    if resolved.serializable {
                        self.cache.invalidate_buckets(&buckets).await;
                    } else {
                        self.cache.invalidate_buckets_with_buffers(&buckets).await;
                    }
                }
                return Ok(Intercepted {
                    payload,
                    status: CacheStatus::Bypass,
                });
            }
            CachePolicy::Populate(populate) => populate,
        };

        if !resolved.enabled {
            let payload = handler().await?;
            return Ok(Intercepted {
                payload,
                status: CacheStatus::Bypass,
            });
        }

        let suffix = populate.suffix_for(request);
        let data_key = self
            .cache
            .build_cache_data_key(&request.key_params(), &suffix);

        match self
            .cache
            .get_cache_by_key(&data_key, resolved.timeout, resolved.serializable)
            .await
        {
            Ok(Some(payload)) => {
                return Ok(Intercepted {
                    payload,
                    status: CacheStatus::Hit,
                });
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(key = %data_key, error = %e, "cache read failed, treating as miss"),
        }

        let payload = handler().await?;

        if payload.is_serializable() != resolved.serializable {
            tracing::warn!(
                key = %data_key,
                payload = payload.kind(),
                serializable = resolved.serializable,
                "payload does not match the cache mode, skipping cache write"
            );
            return Ok(Intercepted {
                payload,
                status: CacheStatus::Miss,
            });
        }

        let buckets = populate.select_buckets(&BucketContext {
            request,
            data: Some(&payload),
        });
        if !buckets.is_empty() {
            self.cache.set_buckets(&buckets, &data_key).await;
        }
        self.cache
            .set_payload(&payload, &data_key, Some(resolved.ttl))
            .await;

        Ok(Intercepted {
            payload,
            status: CacheStatus::Miss,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;
    use gavel_db_memory::MemoryStore;
    use serde_json::json;

    use super::*;
    use crate::cache::{CacheInvalidate, CachePopulate, CacheSettings};

    fn interceptor() -> CacheInterceptor {
        CacheInterceptor::new(Arc::new(CacheService::new(
            Arc::new(MemoryStore::new()),
            CacheSettings::default(),
        )))
    }

    fn request() -> RequestContext {
        RequestContext::new("GET", "localhost", "/items/666").with_param("id", "666")
    }

    fn item_policy() -> CachePolicy {
        CachePopulate::new(|ctx| {
            vec![
                ctx.request.param("id").unwrap_or_default().to_owned(),
                "items".to_owned(),
            ]
        })
        .into()
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let interceptor = interceptor();
        let calls = &AtomicUsize::new(0);
        let handler = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, std::convert::Infallible>(CachedPayload::Json(json!({"id": "666"})))
        };

        let first = interceptor
            .intercept(&request(), &item_policy(), handler)
            .await
            .unwrap();
        assert_eq!(first.status, CacheStatus::Miss);

        let second = interceptor
            .intercept(&request(), &item_policy(), handler)
            .await
            .unwrap();
        assert_eq!(second.status, CacheStatus::Hit);
        assert_eq!(second.payload, first.payload);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let mut buckets = interceptor.cache().get_all_bucket_ids().await.unwrap();
        buckets.sort();
        assert_eq!(buckets, vec!["666", "items"]);
    }

    #[tokio::test]
    async fn test_unsafe_method_bypasses() {
        let interceptor = interceptor();
        let post = RequestContext::new("POST", "localhost", "/items/666").with_param("id", "666");
        let out = interceptor
            .intercept(&post, &item_policy(), || async {
                Ok::<_, std::convert::Infallible>(CachedPayload::Json(json!(1)))
            })
            .await
            .unwrap();
        assert_eq!(out.status, CacheStatus::Bypass);
        assert!(interceptor.cache().get_all_bucket_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_handler_error_is_not_cached() {
        let interceptor = interceptor();
        let err = interceptor
            .intercept(&request(), &item_policy(), || async { Err::<CachedPayload, _>("boom") })
            .await
            .unwrap_err();
        assert_eq!(err, "boom");
        assert!(interceptor.cache().get_all_bucket_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_binary_mode_rejects_json_payload() {
        let interceptor = interceptor();
        let policy: CachePolicy = CachePopulate::new(|_| vec!["files".to_owned()])
            .serializable(false)
            .into();

        let out = interceptor
            .intercept(&request(), &policy, || async {
                Ok::<_, std::convert::Infallible>(CachedPayload::Json(json!("not a buffer")))
            })
            .await
            .unwrap();
        assert_eq!(out.status, CacheStatus::Miss);
        assert!(interceptor.cache().get_all_bucket_ids().await.unwrap().is_empty());

        let out = interceptor
            .intercept(&request(), &policy, || async {
                Ok::<_, std::convert::Infallible>(CachedPayload::BinaryList(vec![
                    Bytes::from("a"),
                    Bytes::from("b"),
                ]))
            })
            .await
            .unwrap();
        assert_eq!(out.status, CacheStatus::Miss);

        let hit = interceptor
            .intercept(&request(), &policy, || async {
                Ok::<_, std::convert::Infallible>(CachedPayload::Binary(Bytes::new()))
            })
            .await
            .unwrap();
        assert_eq!(hit.status, CacheStatus::Hit);
        assert_eq!(
            hit.payload,
            CachedPayload::BinaryList(vec![Bytes::from("a"), Bytes::from("b")])
        );
    }

    #[tokio::test]
    async fn test_invalidate_drops_buckets_after_handler() {
        let interceptor = interceptor();
        interceptor
            .intercept(&request(), &item_policy(), || async {
                Ok::<_, std::convert::Infallible>(CachedPayload::Json(json!({"price": 10})))
            })
            .await
            .unwrap();

        let bid = RequestContext::new("POST", "localhost", "/bids/spin-lock");
        let invalidate: CachePolicy = CacheInvalidate::new(|_| vec!["666".to_owned()]).into();
        let out = interceptor
            .intercept(&bid, &invalidate, || async {
                Ok::<_, std::convert::Infallible>(CachedPayload::Json(json!({"price": 11})))
            })
            .await
            .unwrap();
        assert_eq!(out.status, CacheStatus::Bypass);

        let after = interceptor
            .intercept(&request(), &item_policy(), || async {
                Ok::<_, std::convert::Infallible>(CachedPayload::Json(json!({"price": 11})))
            })
            .await
            .unwrap();
        assert_eq!(after.status, CacheStatus::Miss);
        assert_eq!(after.payload, CachedPayload::Json(json!({"price": 11})));
    }
}
