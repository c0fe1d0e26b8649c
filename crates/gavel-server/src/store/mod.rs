//! Store selection.

mod redis_store;

use std::sync::Arc;

use gavel_db_memory::MemoryStore;
use gavel_storage::{DynStore, StoreError};

use crate::config::RedisConfig;

pub use redis_store::RedisStore;

/// Create the primary store based on configuration.
///
/// ## Store Modes
///
/// - **Redis disabled**: in-process [`MemoryStore`]
/// - **Redis enabled**: connects to Redis, falls back to memory on failure
///
/// ## Graceful Degradation
///
/// If the Redis connection fails the server still starts on the in-memory
/// store, so a single instance keeps working without Redis.
pub async fn create_store(config: &RedisConfig) -> DynStore {
    if !config.enabled {
        tracing::info!("Redis disabled, using in-memory store");
        return Arc::new(MemoryStore::with_default_ttl(config.default_ttl()));
    }

    tracing::info!(url = %config.url, "Connecting to Redis");
    match connect(&config.url, config).await {
        Ok(store) => {
            tracing::info!("Connected to Redis");
            Arc::new(store)
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to connect to Redis. Falling back to in-memory store."
            );
            Arc::new(MemoryStore::with_default_ttl(config.default_ttl()))
        }
    }
}

/// Nodes for the quorum lock.
///
/// Every `quorum_urls` entry becomes a node, reachable or not, so the
/// majority is always taken over the configured node count. A node that is
/// down fails its share of every lock round until it comes back. With no URLs
/// configured the primary store is the single node.
pub async fn create_quorum_nodes(
    config: &RedisConfig,
    primary: &DynStore,
) -> Result<Vec<DynStore>, StoreError> {
    if !config.enabled || config.quorum_urls.is_empty() {
        return Ok(vec![primary.clone()]);
    }

    let mut nodes: Vec<DynStore> = Vec::with_capacity(config.quorum_urls.len());
    for url in &config.quorum_urls {
        let store = RedisStore::from_url(url, config)?;
        if let Err(e) = store.ping().await {
            tracing::warn!(url = %url, error = %e, "Quorum node unreachable, keeping it as a failing node");
        }
        nodes.push(Arc::new(store));
    }
    tracing::info!(nodes = nodes.len(), quorum = nodes.len() / 2 + 1, "Quorum lock nodes configured");
    Ok(nodes)
}

async fn connect(url: &str, config: &RedisConfig) -> Result<RedisStore, StoreError> {
    let store = RedisStore::from_url(url, config)?;
    store.ping().await?;
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::{LockError, LockStrategy, QuorumLock, QuorumLockOptions};
    use gavel_storage::KvStore;
    use std::time::Duration;

    #[tokio::test]
    async fn test_disabled_redis_uses_memory() {
        let store = create_store(&RedisConfig::default()).await;
        assert_eq!(store.backend_name(), "memory");

        let nodes = create_quorum_nodes(&RedisConfig::default(), &store)
            .await
            .unwrap();
        assert_eq!(nodes.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_redis_falls_back() {
        let config = RedisConfig {
            enabled: true,
            url: "redis://127.0.0.1:1".into(),
            timeout_ms: 200,
            ..RedisConfig::default()
        };
        let store = create_store(&config).await;
        assert_eq!(store.backend_name(), "memory");
    }

    #[tokio::test]
    async fn test_unreachable_quorum_nodes_block_acquisition() {
        let config = RedisConfig {
            enabled: true,
            url: "redis://127.0.0.1:1".into(),
            timeout_ms: 200,
            quorum_urls: vec![
                "redis://127.0.0.1:1".into(),
                "redis://127.0.0.1:2".into(),
                "redis://127.0.0.1:3".into(),
            ],
            ..RedisConfig::default()
        };
        let primary = create_store(&config).await;
        assert_eq!(primary.backend_name(), "memory");

        let nodes = create_quorum_nodes(&config, &primary).await.unwrap();
        assert_eq!(nodes.len(), 3);
        assert!(nodes.iter().all(|node| node.backend_name() == "redis"));

        let lock = QuorumLock::new(
            nodes,
            QuorumLockOptions {
                retry_count: 0,
                retry_jitter: Duration::ZERO,
                ..QuorumLockOptions::default()
            },
        );
        let err = lock
            .acquire("item", Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::QuorumNotReached { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn test_malformed_quorum_url_is_an_error() {
        let config = RedisConfig {
            enabled: true,
            quorum_urls: vec!["not a url".into()],
            ..RedisConfig::default()
        };
        let primary = create_store(&RedisConfig::default()).await;
        assert!(create_quorum_nodes(&config, &primary).await.is_err());
    }
}
