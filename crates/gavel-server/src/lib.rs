//! # gavel-server
//!
//! Caching and contention-control backend for the Gavel auction house.
//!
//! - [`cache`]: read-through/write-back response cache with bucket
//!   invalidation, a failure circuit and optional compression
//! - [`lock`]: no-op, spin and quorum (Redlock-style) locks over the store
//! - [`auction`]: items and bids, placed under a chosen lock strategy
//! - [`store`]: Redis adapter and store selection
//!
//! The HTTP surface lives in [`server`] and [`routes`].

pub mod auction;
pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod lock;
pub mod metrics;
pub mod middleware;
pub mod observability;
pub mod routes;
pub mod server;
pub mod store;

pub use config::{AppConfig, CacheConfig, LockConfig, RedisConfig, ServerConfig};
pub use error::ApiError;
pub use observability::init_tracing;
pub use server::{AppState, GavelServer, ServerBuilder, build_app};
pub use store::{create_quorum_nodes, create_store};
