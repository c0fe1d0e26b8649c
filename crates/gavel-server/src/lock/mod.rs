//! Mutual exclusion over store-held locks.
//!
//! Three interchangeable strategies share the [`LockStrategy`] contract:
//!
//! | Kind | Key | Guarantee |
//! |------|-----|-----------|
//! | [`LockKind::None`] | none | nothing, callers race |
//! | [`LockKind::Spin`] | `lock:<resource>` | single node, `SET NX` with bounded retry |
//! | [`LockKind::Quorum`] | `lock-<resource>` | majority of independent nodes, drift compensated |
//!
//! A lock exists only while its key holds the issuing token. Ownership is
//! expressed through the store's conditional writes, never through in-process
//! mutexes, so it holds across server instances.

mod noop;
mod quorum;
mod service;
mod spin;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use gavel_storage::StoreError;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

pub use noop::NoLock;
pub use quorum::{QuorumLock, QuorumLockOptions};
pub use service::LockService;
pub use spin::{SpinLock, SpinLockOptions};

/// Which strategy guards a critical section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockKind {
    None,
    Spin,
    Quorum,
}

impl LockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockKind::None => "none",
            LockKind::Spin => "spin",
            LockKind::Quorum => "quorum",
        }
    }
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A held lock.
///
/// Only [`LockStrategy::acquire`] and [`LockStrategy::extend`] produce one;
/// [`LockStrategy::release`] consumes its token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lock {
    pub kind: LockKind,
    pub resource: String,
    pub key: String,
    pub token: Uuid,
    pub ttl: Duration,
    /// Instant after which the lock must no longer be relied upon.
    pub expiration: Instant,
}

impl Lock {
    /// Time left before the lock stops being valid.
    pub fn remaining(&self) -> Duration {
        self.expiration.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    pub(crate) fn token_value(&self) -> String {
        self.token.to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("unable to acquire lock on '{resource}' after {attempts} attempts")]
    NotAcquired { resource: String, attempts: u32 },

    #[error("unable to reach quorum for '{resource}' after {attempts} attempts")]
    QuorumNotReached { resource: String, attempts: u32 },

    #[error("lock on '{resource}' is not held by this token")]
    NotHeld { resource: String },

    #[error("failed to extend lock on '{resource}'")]
    ExtensionFailed { resource: String },

    #[error("lock store error: {0}")]
    Store(#[from] StoreError),
}

impl LockError {
    /// Whether the caller may retry the whole operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LockError::NotAcquired { .. }
                | LockError::QuorumNotReached { .. }
                | LockError::ExtensionFailed { .. }
        )
    }
}

/// Contract shared by every lock strategy.
#[async_trait]
pub trait LockStrategy: Send + Sync {
    fn kind(&self) -> LockKind;

    /// Blocks (with the strategy's retry budget) until `resource` is held.
    async fn acquire(&self, resource: &str, ttl: Duration) -> Result<Lock, LockError>;

    /// Gives the lock up.
    async fn release(&self, lock: &Lock) -> Result<(), LockError>;

    /// Pushes the expiry of a held lock `ttl` into the future.
    async fn extend(&self, lock: &Lock, ttl: Duration) -> Result<Lock, LockError>;
}
