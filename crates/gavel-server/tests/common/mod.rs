#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use gavel_db_memory::MemoryStore;
use gavel_storage::{DynStore, KvStore, SetOptions, SetOutcome, StoreError};

/// Wraps a store and fails every call while switched on.
///
/// `calls` counts the calls that reached the store, failed or not.
pub struct FailingStore {
    inner: DynStore,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl FailingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(MemoryStore::new()),
            failing: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<&DynStore, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::connection("connection refused"))
        } else {
            Ok(&self.inner)
        }
    }
}

#[async_trait]
impl KvStore for FailingStore {
    fn backend_name(&self) -> &'static str {
        "failing"
    }

    async fn get_buffer(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        self.enter()?.get_buffer(key).await
    }

    async fn set_buffer(
        &self,
        key: &str,
        value: Bytes,
        options: SetOptions,
    ) -> Result<SetOutcome, StoreError> {
        self.enter()?.set_buffer(key, value, options).await
    }

    async fn del(&self, key: &str) -> Result<u64, StoreError> {
        self.enter()?.del(key).await
    }

    async fn sadd(
        &self,
        key: &str,
        members: &[String],
        ttl: Option<Duration>,
    ) -> Result<u64, StoreError> {
        self.enter()?.sadd(key, members, ttl).await
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.enter()?.smembers(key).await
    }

    async fn incr_by_float(
        &self,
        key: &str,
        amount: f64,
        ttl: Option<Duration>,
    ) -> Result<f64, StoreError> {
        self.enter()?.incr_by_float(key, amount, ttl).await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.enter()?.keys(pattern).await
    }

    async fn del_if_eq(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError> {
        self.enter()?.del_if_eq(key, expected).await
    }

    async fn pexpire_if_eq(
        &self,
        key: &str,
        expected: &[u8],
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.enter()?.pexpire_if_eq(key, expected, ttl).await
    }

    async fn flush_all(&self) -> Result<(), StoreError> {
        self.enter()?.flush_all().await
    }
}

/// Delays every call by a fixed latency before it reaches the inner store,
/// so concurrent callers interleave the way they would over a network.
pub struct LatencyStore {
    inner: DynStore,
    latency: Duration,
}

impl LatencyStore {
    pub fn new(inner: DynStore, latency: Duration) -> Arc<Self> {
        Arc::new(Self { inner, latency })
    }

    async fn delay(&self) {
        tokio::time::sleep(self.latency).await;
    }
}

#[async_trait]
impl KvStore for LatencyStore {
    fn backend_name(&self) -> &'static str {
        "latency"
    }

    async fn get_buffer(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        self.delay().await;
        self.inner.get_buffer(key).await
    }

    async fn set_buffer(
        &self,
        key: &str,
        value: Bytes,
        options: SetOptions,
    ) -> Result<SetOutcome, StoreError> {
        self.delay().await;
        self.inner.set_buffer(key, value, options).await
    }

    async fn del(&self, key: &str) -> Result<u64, StoreError> {
        self.delay().await;
        self.inner.del(key).await
    }

    async fn sadd(
        &self,
        key: &str,
        members: &[String],
        ttl: Option<Duration>,
    ) -> Result<u64, StoreError> {
        self.delay().await;
        self.inner.sadd(key, members, ttl).await
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.delay().await;
        self.inner.smembers(key).await
    }

    async fn incr_by_float(
        &self,
        key: &str,
        amount: f64,
        ttl: Option<Duration>,
    ) -> Result<f64, StoreError> {
        self.delay().await;
        self.inner.incr_by_float(key, amount, ttl).await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.delay().await;
        self.inner.keys(pattern).await
    }

    async fn del_if_eq(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError> {
        self.delay().await;
        self.inner.del_if_eq(key, expected).await
    }

    async fn pexpire_if_eq(
        &self,
        key: &str,
        expected: &[u8],
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.delay().await;
        self.inner.pexpire_if_eq(key, expected, ttl).await
    }

    async fn flush_all(&self) -> Result<(), StoreError> {
        self.delay().await;
        self.inner.flush_all().await
    }
}
