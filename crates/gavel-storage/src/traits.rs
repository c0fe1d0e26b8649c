//! Store traits for the key-value capability.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StoreError;
use crate::types::{SetOptions, SetOutcome, buffer_index};

/// The capability every key-value store adapter must implement.
///
/// All operations are fire-and-await with no implicit retries; retry policy
/// belongs to the caller. Implementations must be thread-safe
/// (`Send + Sync`) and cheap to share behind an `Arc`.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Backend name for logging and metrics.
    fn backend_name(&self) -> &'static str;

    /// Reads the raw bytes stored at `key`.
    ///
    /// Returns `None` if the key does not exist or has expired.
    async fn get_buffer(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    /// Writes raw bytes at `key` honouring the conditional flags in `options`.
    async fn set_buffer(
        &self,
        key: &str,
        value: Bytes,
        options: SetOptions,
    ) -> Result<SetOutcome, StoreError>;

    /// Deletes `key`, returning the number of removed keys.
    async fn del(&self, key: &str) -> Result<u64, StoreError>;

    /// Adds `members` to the set at `key`.
    ///
    /// When `ttl` is given the set expiry is refreshed if any member was added.
    /// Returns the number of newly added members.
    async fn sadd(
        &self,
        key: &str,
        members: &[String],
        ttl: Option<Duration>,
    ) -> Result<u64, StoreError>;

    /// Reads all members of the set at `key` (empty if missing).
    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Increments the number at `key` by `amount`, creating it with `ttl`
    /// if absent. The TTL of an existing key is left untouched.
    async fn incr_by_float(
        &self,
        key: &str,
        amount: f64,
        ttl: Option<Duration>,
    ) -> Result<f64, StoreError>;

    /// Lists keys matching a glob `pattern` (`*` wildcard).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Deletes `key` only if it currently holds `expected`.
    async fn del_if_eq(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError>;

    /// Resets the TTL of `key` only if it currently holds `expected`.
    async fn pexpire_if_eq(
        &self,
        key: &str,
        expected: &[u8],
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Removes every key from the store.
    async fn flush_all(&self) -> Result<(), StoreError>;
}

/// JSON and multi-buffer helpers available on every [`KvStore`].
#[async_trait]
pub trait KvStoreExt: KvStore {
    /// Reads `key` and parses it as JSON.
    async fn get<T>(&self, key: &str) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned,
    {
        match self.get_buffer(key).await? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// Serializes `value` as JSON and writes it at `key`.
    async fn set<T>(
        &self,
        key: &str,
        value: &T,
        options: SetOptions,
    ) -> Result<SetOutcome, StoreError>
    where
        T: Serialize + Sync + ?Sized,
    {
        let encoded = serde_json::to_vec(value)?;
        self.set_buffer(key, Bytes::from(encoded), options).await
    }

    /// Resolves the set at `set_key` into the buffers its sub-keys hold,
    /// ordered by sub-key index.
    ///
    /// Returns `None` if the set is empty or any sub-key is gone: a partially
    /// expired entry is never served.
    async fn get_buffers(&self, set_key: &str) -> Result<Option<Vec<Bytes>>, StoreError> {
        let mut keys = self.smembers(set_key).await?;
        if keys.is_empty() {
            return Ok(None);
        }
        keys.sort_by_key(|k| buffer_index(k).unwrap_or(usize::MAX));

        let mut buffers = Vec::with_capacity(keys.len());
        for key in &keys {
            match self.get_buffer(key).await? {
                Some(buffer) => buffers.push(buffer),
                None => return Ok(None),
            }
        }
        Ok(Some(buffers))
    }
}

impl<S: KvStore + ?Sized> KvStoreExt for S {}
