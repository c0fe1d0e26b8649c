use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use gavel_storage::{DynStore, SetOptions};
use rand::Rng;
use tokio::time::Instant;
use uuid::Uuid;

use super::{Lock, LockError, LockKind, LockStrategy};
use crate::config::QuorumLockConfig;

/// Fixed allowance added to the clock drift, in line with the Redlock paper.
const DRIFT_ALLOWANCE: Duration = Duration::from_millis(2);

#[derive(Debug, Clone, PartialEq)]
pub struct QuorumLockOptions {
    /// Fraction of the TTL reserved for clock drift between nodes.
    pub drift_factor: f64,
    /// Attempts after the first one.
    pub retry_count: u32,
    pub retry_delay: Duration,
    /// Upper bound of the random delay added to `retry_delay`.
    pub retry_jitter: Duration,
    /// Extend a held lock once its remaining validity drops below this.
    pub automatic_extension_threshold: Duration,
}

impl Default for QuorumLockOptions {
    fn default() -> Self {
        Self::from(&QuorumLockConfig::default())
    }
}

impl From<&QuorumLockConfig> for QuorumLockOptions {
    fn from(config: &QuorumLockConfig) -> Self {
        Self {
            drift_factor: config.drift_factor,
            retry_count: config.retry_count,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            retry_jitter: Duration::from_millis(config.retry_jitter_ms),
            automatic_extension_threshold: Duration::from_millis(
                config.automatic_extension_threshold_ms,
            ),
        }
    }
}

/// Redlock-style lock across independent store nodes.
///
/// A lock is held when a majority of nodes accepted `SET NX` within the
/// lock's validity window, where validity is the TTL minus the time spent
/// acquiring and the drift allowance. Failed rounds release whatever was
/// taken before retrying.
pub struct QuorumLock {
    nodes: Vec<DynStore>,
    options: QuorumLockOptions,
}

impl QuorumLock {
    pub fn new(nodes: Vec<DynStore>, options: QuorumLockOptions) -> Self {
        Self { nodes, options }
    }

    pub fn options(&self) -> &QuorumLockOptions {
        &self.options
    }

    pub fn lock_key(resource: &str) -> String {
        format!("lock-{resource}")
    }

    /// Number of nodes that must agree.
    pub fn quorum(&self) -> usize {
        self.nodes.len() / 2 + 1
    }

    fn drift(&self, ttl: Duration) -> Duration {
        ttl.mul_f64(self.options.drift_factor) + DRIFT_ALLOWANCE
    }

    fn retry_pause(&self) -> Duration {
        let jitter_ms = self.options.retry_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.options.retry_delay + Duration::from_millis(jitter)
    }

    async fn try_set(&self, key: &str, value: &Bytes, ttl: Duration) -> usize {
        let writes = self.nodes.iter().map(|node| {
            node.set_buffer(key, value.clone(), SetOptions::new().ttl(ttl).skip_if_exists())
        });
        join_all(writes)
            .await
            .into_iter()
            .filter(|result| match result {
                Ok(outcome) => outcome.applied,
                Err(e) => {
                    tracing::debug!(key = %key, error = %e, "quorum node rejected lock");
                    false
                }
            })
            .count()
    }

    async fn release_all(&self, key: &str, token: &str) -> usize {
        let deletes = self
            .nodes
            .iter()
            .map(|node| node.del_if_eq(key, token.as_bytes()));
        join_all(deletes)
            .await
            .into_iter()
            .filter(|result| matches!(result, Ok(true)))
            .count()
    }

    /// Validity end for a round started at `started`, if still valid now.
    fn validity(&self, started: Instant, ttl: Duration) -> Option<Instant> {
        let usable = ttl.checked_sub(self.drift(ttl))?;
        let expiration = started + usable;
        (expiration > Instant::now()).then_some(expiration)
    }
}

#[async_trait]
impl LockStrategy for QuorumLock {
    fn kind(&self) -> LockKind {
        LockKind::Quorum
    }

    async fn acquire(&self, resource: &str, ttl: Duration) -> Result<Lock, LockError> {
        let key = Self::lock_key(resource);
        let token = Uuid::new_v4();
        let token_value = token.to_string();
        let value = Bytes::from(token_value.clone());
        let attempts = self.options.retry_count.saturating_add(1);
        let quorum = self.quorum();

        for attempt in 1..=attempts {
            let started = Instant::now();
            let votes = self.try_set(&key, &value, ttl).await;

            if votes >= quorum {
                if let Some(expiration) = self.validity(started, ttl) {
                    tracing::debug!(key = %key, attempt, votes, "quorum lock acquired");
                    return Ok(Lock {
                        kind: LockKind::Quorum,
                        resource: resource.to_owned(),
                        key,
                        token,
                        ttl,
                        expiration,
                    });
                }
            }

            // Undo partial acquisitions so other contenders can progress.
            if votes > 0 {
                self.release_all(&key, &token_value).await;
            }
            tracing::trace!(key = %key, attempt, votes, quorum, "quorum not reached");
            if attempt < attempts {
                tokio::time::sleep(self.retry_pause()).await;
            }
        }

        tracing::warn!(key = %key, attempts, "quorum lock not acquired");
        Err(LockError::QuorumNotReached {
            resource: resource.to_owned(),
            attempts,
        })
    }

    async fn release(&self, lock: &Lock) -> Result<(), LockError> {
        let released = self.release_all(&lock.key, &lock.token_value()).await;
        if released >= self.quorum() {
            Ok(())
        } else {
            Err(LockError::NotHeld {
                resource: lock.resource.clone(),
            })
        }
    }

    async fn extend(&self, lock: &Lock, ttl: Duration) -> Result<Lock, LockError> {
        if lock.is_expired() {
            return Err(LockError::ExtensionFailed {
                resource: lock.resource.clone(),
            });
        }

        let started = Instant::now();
        let token = lock.token_value();
        let extensions = self
            .nodes
            .iter()
            .map(|node| node.pexpire_if_eq(&lock.key, token.as_bytes(), ttl));
        let votes = join_all(extensions)
            .await
            .into_iter()
            .filter(|result| matches!(result, Ok(true)))
            .count();

        match self.validity(started, ttl) {
            Some(expiration) if votes >= self.quorum() => {
                tracing::debug!(key = %lock.key, votes, "quorum lock extended");
                Ok(Lock {
                    ttl,
                    expiration,
                    ..lock.clone()
                })
            }
            _ => Err(LockError::ExtensionFailed {
                resource: lock.resource.clone(),
            }),
        }
    }
}
