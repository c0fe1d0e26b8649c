mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use gavel_db_memory::MemoryStore;
use gavel_server::cache::{
    CacheInterceptor, CacheInvalidate, CachePolicy, CachePopulate, CacheService, CacheSettings,
    CacheStatus, CachedPayload, RequestContext,
};
use serde_json::json;

use common::FailingStore;

type Infallible = std::convert::Infallible;

fn item_policy() -> CachePolicy {
    CachePopulate::new(|ctx| {
        vec![
            ctx.request.param("id").unwrap_or_default().to_owned(),
            "items".to_owned(),
        ]
    })
    .unique_suffix(|ctx| ctx.request.param("id").unwrap_or_default().to_owned())
    .into()
}

fn read(id: &str) -> RequestContext {
    RequestContext::new("GET", "localhost", format!("/items/{id}")).with_param("id", id)
}

#[tokio::test]
async fn cache_outage_degrades_to_handler() {
    let interceptor = CacheInterceptor::new(Arc::new(CacheService::new(
        FailingStore::new(),
        CacheSettings::default(),
    )));
    let calls = &AtomicUsize::new(0);

    for _ in 0..6 {
        let out = interceptor
            .intercept(&read("666"), &item_policy(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(CachedPayload::Json(json!({"id": "666"})))
            })
            .await
            .unwrap();
        assert_eq!(out.status, CacheStatus::Miss);
        assert_eq!(out.payload, CachedPayload::Json(json!({"id": "666"})));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 6);
    assert!(interceptor.cache().circuit().is_open());
}

#[tokio::test]
async fn entries_are_keyed_per_request() {
    let interceptor = CacheInterceptor::new(Arc::new(CacheService::new(
        Arc::new(MemoryStore::new()),
        CacheSettings::default(),
    )));

    for id in ["1", "2"] {
        let out = interceptor
            .intercept(&read(id), &item_policy(), || async move {
                Ok::<_, Infallible>(CachedPayload::Json(json!({ "id": id })))
            })
            .await
            .unwrap();
        assert_eq!(out.status, CacheStatus::Miss);
    }

    let hit = interceptor
        .intercept(&read("2"), &item_policy(), || async {
            Ok::<_, Infallible>(CachedPayload::Json(json!(null)))
        })
        .await
        .unwrap();
    assert_eq!(hit.status, CacheStatus::Hit);
    assert_eq!(hit.payload, CachedPayload::Json(json!({"id": "2"})));

    let query = read("2").with_query("fields", "price");
    let other = interceptor
        .intercept(&query, &item_policy(), || async {
            Ok::<_, Infallible>(CachedPayload::Json(json!({"price": 1})))
        })
        .await
        .unwrap();
    assert_eq!(other.status, CacheStatus::Miss);
}

#[tokio::test(start_paused = true)]
async fn route_ttl_overrides_default() {
    let interceptor = CacheInterceptor::new(Arc::new(CacheService::new(
        Arc::new(MemoryStore::new()),
        CacheSettings::default(),
    )));
    let policy: CachePolicy = CachePopulate::new(|_| vec!["short".to_owned()])
        .ttl(Duration::from_secs(1))
        .into();
    let handler = || async { Ok::<_, Infallible>(CachedPayload::Json(json!(1))) };

    let request = read("1");
    assert_eq!(
        interceptor.intercept(&request, &policy, handler).await.unwrap().status,
        CacheStatus::Miss
    );
    assert_eq!(
        interceptor.intercept(&request, &policy, handler).await.unwrap().status,
        CacheStatus::Hit
    );

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(
        interceptor.intercept(&request, &policy, handler).await.unwrap().status,
        CacheStatus::Miss
    );
}

#[tokio::test]
async fn buffer_invalidation_uses_the_cascade() {
    let store = Arc::new(MemoryStore::new());
    let interceptor = CacheInterceptor::new(Arc::new(CacheService::new(
        store.clone(),
        CacheSettings::default(),
    )));
    let files: CachePolicy = CachePopulate::new(|_| vec!["files".to_owned()])
        .serializable(false)
        .into();

    interceptor
        .intercept(&read("f"), &files, || async {
            Ok::<_, Infallible>(CachedPayload::BinaryList(vec![
                bytes::Bytes::from("a"),
                bytes::Bytes::from("b"),
            ]))
        })
        .await
        .unwrap();
    assert!(!store.is_empty());

    let upload = RequestContext::new("POST", "localhost", "/files");
    let invalidate: CachePolicy = CacheInvalidate::new(|_| vec!["files".to_owned()])
        .serializable(false)
        .into();
    interceptor
        .intercept(&upload, &invalidate, || async {
            Ok::<_, Infallible>(CachedPayload::Json(json!({"ok": true})))
        })
        .await
        .unwrap();
    assert!(store.is_empty());
}
