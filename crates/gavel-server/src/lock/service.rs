use std::future::Future;
use std::time::Duration;

use gavel_storage::DynStore;

use super::{Lock, LockError, LockKind, LockStrategy, NoLock, QuorumLock, SpinLock};
use crate::config::LockConfig;
use crate::metrics;

/// Entry point for guarded critical sections.
///
/// Holds one instance of each strategy and picks by [`LockKind`] per call.
pub struct LockService {
    none: NoLock,
    spin: SpinLock,
    quorum: QuorumLock,
}

impl LockService {
    pub fn new(spin: SpinLock, quorum: QuorumLock) -> Self {
        Self {
            none: NoLock,
            spin,
            quorum,
        }
    }

    /// Spin locks live on `store`; quorum locks span `quorum_nodes`.
    pub fn from_config(store: DynStore, quorum_nodes: Vec<DynStore>, config: &LockConfig) -> Self {
        Self::new(
            SpinLock::new(store, (&config.spin).into()),
            QuorumLock::new(quorum_nodes, (&config.quorum).into()),
        )
    }

    pub fn strategy(&self, kind: LockKind) -> &dyn LockStrategy {
        match kind {
            LockKind::None => &self.none,
            LockKind::Spin => &self.spin,
            LockKind::Quorum => &self.quorum,
        }
    }

    pub async fn acquire(
        &self,
        kind: LockKind,
        resource: &str,
        ttl: Duration,
    ) -> Result<Lock, LockError> {
        match self.strategy(kind).acquire(resource, ttl).await {
            Ok(lock) => {
                metrics::record_lock_acquired(kind.as_str());
                Ok(lock)
            }
            Err(e) => {
                metrics::record_lock_failure(kind.as_str());
                Err(e)
            }
        }
    }

    pub async fn release(&self, lock: &Lock) -> Result<(), LockError> {
        self.strategy(lock.kind).release(lock).await
    }

    /// Runs `work` while holding `resource` under `kind`.
    ///
    /// Quorum locks are extended in the background whenever their remaining
    /// validity drops below the configured threshold; a failed extension drops
    /// `work` and yields [`LockError::ExtensionFailed`]. The lock is released
    /// afterwards whatever the outcome of `work`. Release failures are logged,
    /// since `work` has already taken effect.
    pub async fn run_exclusive<T, E, F>(
        &self,
        kind: LockKind,
        resource: &str,
        ttl: Duration,
        work: F,
    ) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>> + Send,
        E: From<LockError>,
    {
        let lock = self.acquire(kind, resource, ttl).await?;
        tracing::debug!(resource = %resource, strategy = %kind, "entered critical section");

        let (lock, outcome) = match kind {
            LockKind::Quorum => self.run_extending(lock, work).await,
            LockKind::None | LockKind::Spin => {
                let outcome = work.await;
                (lock, Ok(outcome))
            }
        };

        if let Err(e) = self.release(&lock).await {
            tracing::warn!(resource = %resource, strategy = %kind, error = %e, "lock release failed");
        }
        tracing::debug!(resource = %resource, strategy = %kind, "left critical section");

        match outcome {
            Ok(result) => result,
            Err(e) => {
                metrics::record_lock_failure(kind.as_str());
                Err(e.into())
            }
        }
    }

    async fn run_extending<O, F>(&self, mut lock: Lock, work: F) -> (Lock, Result<O, LockError>)
    where
        F: Future<Output = O> + Send,
    {
        let threshold = self.quorum.options().automatic_extension_threshold;
        if threshold.is_zero() {
            return (lock, Ok(work.await));
        }

        let mut work = std::pin::pin!(work);
        loop {
            // Never sooner than half the remaining validity, so a threshold
            // close to the TTL does not turn into a busy loop.
            let remaining = lock.remaining();
            let wait = remaining.saturating_sub(threshold).max(remaining / 2);

            tokio::select! {
                output = &mut work => return (lock, Ok(output)),
                _ = tokio::time::sleep(wait) => {
                    match self.quorum.extend(&lock, lock.ttl).await {
                        Ok(extended) => lock = extended,
                        Err(e) => {
                            tracing::warn!(resource = %lock.resource, error = %e, "automatic lock extension failed");
                            return (lock, Err(e));
                        }
                    }
                }
            }
        }
    }
}
