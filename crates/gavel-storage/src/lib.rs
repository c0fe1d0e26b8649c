//! # gavel-storage
//!
//! Key-value store capability for the Gavel server.
//!
//! This crate defines the contract every store adapter implements. It does not
//! contain any implementations: the in-process store lives in
//! `gavel-db-memory` and the Redis adapter in `gavel-server`.
//!
//! ## Overview
//!
//! [`KvStore`] is object safe and byte oriented:
//! - plain and conditional writes with TTL (`SET ... NX|XX PX|KEEPTTL GET`)
//! - set membership (`SADD`/`SMEMBERS`)
//! - token-checked delete and extend, used by the lock primitives
//! - `INCRBYFLOAT`, pattern scan and full flush
//!
//! [`KvStoreExt`] layers typed JSON helpers on top of it:
//!
//! ```ignore
//! use gavel_storage::{KvStore, KvStoreExt, SetOptions};
//!
//! async fn remember(store: &dyn KvStore) -> Result<(), StoreError> {
//!     store.set("greeting", &"hello", SetOptions::new()).await?;
//!     let value: Option<String> = store.get("greeting").await?;
//!     assert_eq!(value.as_deref(), Some("hello"));
//!     Ok(())
//! }
//! ```

mod error;
mod traits;
mod types;

pub use error::{ErrorCategory, StoreError};
pub use traits::{KvStore, KvStoreExt};
pub use types::{SetCondition, SetOptions, SetOutcome, buffer_index};

/// Type alias for a store result.
pub type StoreResult<T> = Result<T, StoreError>;

/// Type alias for a shared store trait object.
pub type DynStore = std::sync::Arc<dyn KvStore>;
