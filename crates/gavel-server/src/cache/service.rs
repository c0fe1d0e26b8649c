use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use gavel_storage::{DynStore, KvStoreExt, SetOptions, StoreError};
use serde_json::Value;

use super::CacheError;
use super::circuit::FailureCircuit;
use super::keys::{self, CacheKeyParams};
use super::payload::{self, CachedPayload};
use crate::config::CacheConfig;
use crate::metrics;

/// Tunables of a [`CacheService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub default_timeout: Duration,
    pub default_ttl: Duration,
    pub bucket_ttl: Duration,
    pub failure_threshold: u32,
    pub failure_ttl: Duration,
    pub enable_compression: bool,
    pub default_serializable: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for CacheSettings {
    fn from(config: &CacheConfig) -> Self {
        Self {
            default_timeout: Duration::from_millis(config.default_timeout_ms),
            default_ttl: Duration::from_millis(config.default_ttl_ms),
            bucket_ttl: Duration::from_millis(config.bucket_ttl_ms),
            failure_threshold: config.failure_threshold,
            failure_ttl: Duration::from_millis(config.failure_ttl_ms),
            enable_compression: config.enable_compression,
            default_serializable: config.default_serializable,
        }
    }
}

/// Read-through/write-through cache over a [`KvStore`](gavel_storage::KvStore).
///
/// Reads are bounded by a timeout and guarded by a [`FailureCircuit`]; they
/// fail with a recoverable [`CacheError`]. Writes and invalidations are best
/// effort: errors are logged and never returned.
pub struct CacheService {
    store: DynStore,
    settings: CacheSettings,
    circuit: Arc<FailureCircuit>,
}

impl CacheService {
    pub fn new(store: DynStore, settings: CacheSettings) -> Self {
        let circuit = Arc::new(FailureCircuit::new(
            settings.failure_threshold,
            settings.failure_ttl,
        ));
        Self::with_circuit(store, settings, circuit)
    }

    pub fn with_circuit(
        store: DynStore,
        settings: CacheSettings,
        circuit: Arc<FailureCircuit>,
    ) -> Self {
        Self {
            store,
            settings,
            circuit,
        }
    }

    /// The underlying store.
    pub fn provider(&self) -> &DynStore {
        &self.store
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn circuit(&self) -> &FailureCircuit {
        &self.circuit
    }

    pub fn build_cache_data_key(&self, params: &CacheKeyParams, unique_suffix: &str) -> String {
        keys::build_cache_data_key(params, unique_suffix)
    }

    /// Reads the entry for `params` and `unique_suffix`.
    pub async fn get_cache(
        &self,
        params: &CacheKeyParams,
        unique_suffix: &str,
        timeout: Duration,
        serializable: bool,
    ) -> Result<Option<CachedPayload>, CacheError> {
        let data_key = self.build_cache_data_key(params, unique_suffix);
        self.get_cache_by_key(&data_key, timeout, serializable)
            .await
    }

    /// Reads `data_key` within `timeout`.
    ///
    /// Fails straight away while the circuit is open. Timeouts and store
    /// errors count as failures; an undecodable entry is logged and read as a
    /// miss.
    pub async fn get_cache_by_key(
        &self,
        data_key: &str,
        timeout: Duration,
        serializable: bool,
    ) -> Result<Option<CachedPayload>, CacheError> {
        if self.circuit.is_open() {
            metrics::record_cache_failure("circuit_open");
            metrics::set_circuit_open(true);
            return Err(CacheError::CircuitOpen);
        }
        metrics::set_circuit_open(false);

        let read = tokio::time::timeout(timeout, self.read_entry(data_key, serializable)).await;
        let entry = match read {
            Ok(Ok(entry)) => entry,
            Ok(Err(CacheError::Decode { key, message })) => {
                tracing::error!(key = %key, error = %message, "failed to decode cached entry");
                None
            }
            Ok(Err(e)) => {
                self.circuit.record_failure();
                metrics::record_cache_failure("store");
                return Err(e);
            }
            Err(_) => {
                self.circuit.record_failure();
                metrics::record_cache_failure("timeout");
                return Err(CacheError::Timeout(timeout));
            }
        };

        if entry.is_some() {
            tracing::debug!(key = %data_key, "cache hit");
            metrics::record_cache_hit();
        } else {
            tracing::debug!(key = %data_key, "cache miss");
            metrics::record_cache_miss();
        }
        Ok(entry)
    }

    async fn read_entry(
        &self,
        data_key: &str,
        serializable: bool,
    ) -> Result<Option<CachedPayload>, CacheError> {
        if !serializable {
            let buffers = self.store.get_buffers(data_key).await?;
            return Ok(buffers.map(CachedPayload::from_buffers));
        }

        if self.settings.enable_compression {
            let Some(packed) = self.store.get_buffer(data_key).await? else {
                return Ok(None);
            };
            let raw = payload::gunzip(&packed).map_err(|e| CacheError::decode(data_key, e))?;
            let value: Value =
                serde_json::from_slice(&raw).map_err(|e| CacheError::decode(data_key, e))?;
            return Ok(Some(CachedPayload::Json(value)));
        }

        match self.store.get::<Value>(data_key).await {
            Ok(value) => Ok(value.map(CachedPayload::Json)),
            Err(StoreError::Serialization { message }) => Err(CacheError::Decode {
                key: data_key.to_owned(),
                message,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes a JSON entry, gzipped when compression is enabled.
    pub async fn set_cache(&self, value: &Value, data_key: &str, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.settings.default_ttl);
        match self.write_json(value, data_key, ttl).await {
            Ok(()) => {
                tracing::trace!(key = %data_key, ttl_ms = ttl.as_millis() as u64, "cache set");
                metrics::record_cache_write("json");
            }
            Err(e) => tracing::error!(key = %data_key, error = %e, "failed to set cache data"),
        }
    }

    async fn write_json(&self, value: &Value, data_key: &str, ttl: Duration) -> Result<(), CacheError> {
        let options = SetOptions::new().ttl(ttl);
        if self.settings.enable_compression {
            let raw = serde_json::to_vec(value).map_err(|e| CacheError::encode(data_key, e))?;
            let packed = payload::gzip(&raw).map_err(|e| CacheError::encode(data_key, e))?;
            self.store
                .set_buffer(data_key, Bytes::from(packed), options)
                .await?;
        } else {
            self.store.set(data_key, value, options).await?;
        }
        Ok(())
    }

    /// Stores `buffers` under generated sub-keys `<dataKey>#1..n` and the set
    /// of sub-key names under `data_key`, all with the same TTL.
    pub async fn set_cache_for_array_of_buffers(
        &self,
        buffers: &[Bytes],
        data_key: &str,
        ttl: Option<Duration>,
    ) {
        if buffers.is_empty() {
            tracing::warn!(key = %data_key, "refusing to cache an empty buffer list");
            return;
        }
        let ttl = ttl.unwrap_or(self.settings.default_ttl);
        let sub_keys: Vec<String> = (1..=buffers.len())
            .map(|index| keys::buffer_sub_key(data_key, index))
            .collect();

        match self.write_buffers(buffers, data_key, &sub_keys, ttl).await {
            Ok(()) => {
                tracing::trace!(key = %data_key, buffers = buffers.len(), "cache set (buffers)");
                metrics::record_cache_write("buffers");
            }
            Err(e) => tracing::error!(
                key = %data_key,
                sub_keys = ?sub_keys,
                error = %e,
                "failed to set cache for array of buffers"
            ),
        }
    }

    async fn write_buffers(
        &self,
        buffers: &[Bytes],
        data_key: &str,
        sub_keys: &[String],
        ttl: Duration,
    ) -> Result<(), StoreError> {
        // A previous entry may have had more sub-keys; drop them with their set.
        let stale = match self.store.smembers(data_key).await {
            Ok(stale) => stale,
            // A JSON entry under the same key: nothing to follow.
            Err(StoreError::WrongType { .. }) => Vec::new(),
            Err(e) => return Err(e),
        };
        delete_all(&self.store, &stale).await?;
        self.store.del(data_key).await?;
        self.store.sadd(data_key, sub_keys, Some(ttl)).await?;

        let writes = sub_keys.iter().zip(buffers).map(|(key, buffer)| {
            self.store
                .set_buffer(key, buffer.clone(), SetOptions::new().ttl(ttl))
        });
        for result in join_all(writes).await {
            result?;
        }
        Ok(())
    }

    /// Writes `payload` on the path its variant belongs to.
    pub async fn set_payload(&self, payload: &CachedPayload, data_key: &str, ttl: Option<Duration>) {
        match payload {
            CachedPayload::Json(value) => self.set_cache(value, data_key, ttl).await,
            CachedPayload::Binary(buffer) => {
                self.set_cache_for_array_of_buffers(std::slice::from_ref(buffer), data_key, ttl)
                    .await
            }
            CachedPayload::BinaryList(buffers) => {
                self.set_cache_for_array_of_buffers(buffers, data_key, ttl)
                    .await
            }
        }
    }

    /// Adds `data_key` to every bucket in `buckets`. Buckets use their own
    /// TTL, independent of the entry's.
    pub async fn set_buckets(&self, buckets: &[String], data_key: &str) {
        tracing::trace!(buckets = ?buckets, key = %data_key, "set buckets");
        let member = [data_key.to_owned()];
        for bucket in buckets {
            let bucket_key = keys::bucket_key(bucket);
            if let Err(e) = self
                .store
                .sadd(&bucket_key, &member, Some(self.settings.bucket_ttl))
                .await
            {
                tracing::error!(bucket = %bucket, key = %data_key, error = %e, "failed to set cache bucket");
            }
        }
    }

    /// Deletes each bucket and every JSON entry it references.
    ///
    /// Returns the number of keys removed.
    pub async fn invalidate_buckets(&self, buckets: &[String]) -> u64 {
        tracing::trace!(buckets = ?buckets, "invalidate buckets (json)");
        let mut removed = 0;
        for bucket in buckets {
            match self.invalidate_json_bucket(&keys::bucket_key(bucket)).await {
                Ok(count) => removed += count,
                Err(e) => {
                    tracing::error!(bucket = %bucket, error = %e, "failed to invalidate cache bucket")
                }
            }
        }
        metrics::record_cache_invalidation(buckets.len());
        removed
    }

    async fn invalidate_json_bucket(&self, bucket_key: &str) -> Result<u64, StoreError> {
        let members = self.store.smembers(bucket_key).await?;
        let mut removed = delete_all(&self.store, &members).await?;
        removed += self.store.del(bucket_key).await?;
        Ok(removed)
    }

    /// Deletes each bucket, every buffer entry it references and every
    /// sub-key of those entries.
    ///
    /// Returns the number of keys removed.
    pub async fn invalidate_buckets_with_buffers(&self, buckets: &[String]) -> u64 {
        tracing::trace!(buckets = ?buckets, "invalidate buckets (buffers)");
        let mut removed = 0;
        for bucket in buckets {
            match self.invalidate_buffer_bucket(&keys::bucket_key(bucket)).await {
                Ok(count) => removed += count,
                Err(e) => {
                    tracing::error!(bucket = %bucket, error = %e, "failed to invalidate cache bucket")
                }
            }
        }
        metrics::record_cache_invalidation(buckets.len());
        removed
    }

    async fn invalidate_buffer_bucket(&self, bucket_key: &str) -> Result<u64, StoreError> {
        let members = self.store.smembers(bucket_key).await?;
        let mut removed = 0;
        for member in &members {
            let sub_keys = match self.store.smembers(member).await {
                Ok(sub_keys) => sub_keys,
                // A JSON entry in a buffer bucket: no sub-keys to follow.
                Err(StoreError::WrongType { .. }) => Vec::new(),
                Err(e) => return Err(e),
            };
            removed += delete_all(&self.store, &sub_keys).await?;
            removed += self.store.del(member).await?;
        }
        // Last, so a failed cascade can be retried through the bucket.
        removed += self.store.del(bucket_key).await?;
        Ok(removed)
    }

    /// Names of all live buckets.
    pub async fn get_all_bucket_ids(&self) -> Result<Vec<String>, CacheError> {
        let bucket_keys = self.store.keys(&keys::bucket_key("*")).await?;
        Ok(bucket_keys
            .iter()
            .filter_map(|key| keys::bucket_name(key))
            .map(str::to_owned)
            .collect())
    }
}

async fn delete_all(store: &DynStore, keys: &[String]) -> Result<u64, StoreError> {
    let mut removed = 0;
    for result in join_all(keys.iter().map(|key| store.del(key))).await {
        removed += result?;
    }
    Ok(removed)
}
