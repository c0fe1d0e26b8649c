use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use gavel_storage::{DynStore, SetOptions};
use tokio::time::Instant;
use uuid::Uuid;

use super::{Lock, LockError, LockKind, LockStrategy};
use crate::config::SpinLockConfig;

/// Retry budget for [`SpinLock`].
///
/// The budget resolves as follows:
/// - `timeout` defaults to `delay * retries` when `retries` is set, else to
///   the lock TTL.
/// - `retries` defaults to `ceil(timeout / delay)`.
///
/// The lock is attempted `retries + 1` times, so zero retries means exactly one
/// attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpinLockOptions {
    pub delay: Duration,
    pub timeout: Option<Duration>,
    pub retries: Option<u32>,
    /// Release with a token-checked delete instead of an unconditional one.
    pub verify_owner: bool,
}

impl Default for SpinLockOptions {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(200),
            timeout: None,
            retries: None,
            verify_owner: true,
        }
    }
}

impl From<&SpinLockConfig> for SpinLockOptions {
    fn from(config: &SpinLockConfig) -> Self {
        Self {
            delay: Duration::from_millis(config.delay_ms),
            timeout: Some(Duration::from_millis(config.timeout_ms)),
            retries: None,
            verify_owner: config.verify_owner,
        }
    }
}

impl SpinLockOptions {
    /// Number of retries after the first attempt for a lock of `ttl`.
    pub fn retries_for(&self, ttl: Duration) -> u32 {
        if let Some(retries) = self.retries {
            return retries;
        }
        let timeout = self.timeout.unwrap_or(ttl);
        let delay = self.delay.as_millis().max(1);
        timeout.as_millis().div_ceil(delay).min(u32::MAX as u128) as u32
    }
}

/// Single-node lock: `SET lock:<resource> <token> NX PX <ttl>` retried every
/// `delay` until it sticks or the budget runs out.
pub struct SpinLock {
    store: DynStore,
    options: SpinLockOptions,
}

impl SpinLock {
    pub fn new(store: DynStore, options: SpinLockOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> &SpinLockOptions {
        &self.options
    }

    pub fn lock_key(resource: &str) -> String {
        format!("lock:{resource}")
    }
}

#[async_trait]
impl LockStrategy for SpinLock {
    fn kind(&self) -> LockKind {
        LockKind::Spin
    }

    async fn acquire(&self, resource: &str, ttl: Duration) -> Result<Lock, LockError> {
        let key = Self::lock_key(resource);
        let token = Uuid::new_v4();
        let value = Bytes::from(token.to_string());
        let attempts = self.options.retries_for(ttl).saturating_add(1);

        for attempt in 1..=attempts {
            let started = Instant::now();
            let outcome = self
                .store
                .set_buffer(
                    &key,
                    value.clone(),
                    SetOptions::new().ttl(ttl).skip_if_exists(),
                )
                .await?;

            if outcome.applied {
                tracing::debug!(key = %key, attempt, "spin lock acquired");
                return Ok(Lock {
                    kind: LockKind::Spin,
                    resource: resource.to_owned(),
                    key,
                    token,
                    ttl,
                    expiration: started + ttl,
                });
            }

            tracing::trace!(key = %key, attempt, attempts, "spin lock busy");
            if attempt < attempts {
                tokio::time::sleep(self.options.delay).await;
            }
        }

        tracing::warn!(key = %key, attempts, "spin lock not acquired");
        Err(LockError::NotAcquired {
            resource: resource.to_owned(),
            attempts,
        })
    }

    async fn release(&self, lock: &Lock) -> Result<(), LockError> {
        if !self.options.verify_owner {
            self.store.del(&lock.key).await?;
            return Ok(());
        }
        if self
            .store
            .del_if_eq(&lock.key, lock.token_value().as_bytes())
            .await?
        {
            Ok(())
        } else {
            Err(LockError::NotHeld {
                resource: lock.resource.clone(),
            })
        }
    }

    async fn extend(&self, lock: &Lock, ttl: Duration) -> Result<Lock, LockError> {
        let started = Instant::now();
        let extended = self
            .store
            .pexpire_if_eq(&lock.key, lock.token_value().as_bytes(), ttl)
            .await?;
        if !extended {
            return Err(LockError::ExtensionFailed {
                resource: lock.resource.clone(),
            });
        }
        Ok(Lock {
            ttl,
            expiration: started + ttl,
            ..lock.clone()
        })
    }
}
