//! In-memory key-value store backend for the Gavel server.
//!
//! [`MemoryStore`] implements the `KvStore` capability from `gavel-storage`
//! on top of a sharded `DashMap`. Expiry is tracked with
//! `tokio::time::Instant`, so tests running on a paused clock observe TTLs
//! deterministically.
//!
//! # Example
//!
//! ```ignore
//! use gavel_db_memory::MemoryStore;
//! use gavel_storage::{KvStoreExt, SetOptions};
//!
//! let store = MemoryStore::new();
//! store.set("#items666", &item, SetOptions::new()).await?;
//! ```

pub mod storage;

pub use gavel_storage::{DynStore, KvStore, KvStoreExt, StoreError};
pub use storage::{DEFAULT_TTL, MemoryStore};

/// Creates a new shareable in-memory store.
pub fn create_memory_store() -> DynStore {
    std::sync::Arc::new(MemoryStore::new())
}
