use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use uuid::Uuid;

use super::{Lock, LockError, LockKind, LockStrategy};

/// Strategy that never touches the store. Critical sections run unguarded.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLock;

#[async_trait]
impl LockStrategy for NoLock {
    fn kind(&self) -> LockKind {
        LockKind::None
    }

    async fn acquire(&self, resource: &str, ttl: Duration) -> Result<Lock, LockError> {
        Ok(Lock {
            kind: LockKind::None,
            resource: resource.to_owned(),
            key: resource.to_owned(),
            token: Uuid::nil(),
            ttl,
            expiration: Instant::now() + ttl,
        })
    }

    async fn release(&self, _lock: &Lock) -> Result<(), LockError> {
        Ok(())
    }

    async fn extend(&self, lock: &Lock, ttl: Duration) -> Result<Lock, LockError> {
        Ok(Lock {
            expiration: Instant::now() + ttl,
            ttl,
            ..lock.clone()
        })
    }
}
