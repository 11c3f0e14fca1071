//! # tagcache
//!
//! A tagged cache over interchangeable storage backends.
//!
//! ## Features
//!
//! - **One contract, several backends:** [`CacheAdapter`] is implemented
//!   for flat key/value stores ([`FlatAdapter`]) and document stores
//!   ([`DocumentAdapter`])
//! - **Tags everywhere:** group keys under tags and invalidate a group with
//!   one `clean`, emulated with reverse indexes where the backend has no
//!   native support
//! - **Namespacing:** disjoint key and tag prefixes, optional SHA-256 key
//!   hashing
//! - **Serialization:** raw bytes, JSON or versioned postcard payloads via
//!   the [`Cache`] facade
//! - **Backends:** in-memory (default), Redis (feature `redis`), in-memory
//!   document store with a TTL sweeper
//!
//! ## Quick Start
//!
//! ```
//! use tagcache::{Cache, CacheAdapter, CacheOptions, FlatAdapter};
//! use tagcache::store::InMemoryStore;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> tagcache::Result<()> {
//! let options = CacheOptions::default();
//! let adapter = FlatAdapter::new(InMemoryStore::new(), &options)?;
//! let cache = Cache::from_options(adapter, &options);
//!
//! cache.save_raw(b"v1".to_vec(), "user:1", &["users"], None).await?;
//! cache
//!     .save_raw(b"v2".to_vec(), "user:2", &["users"], Some(Duration::from_secs(60)))
//!     .await?;
//!
//! cache.clean(&["users"]).await?;
//! assert!(cache.load_raw("user:1").await?.is_none());
//! assert!(cache.adapter().load_tag("users").await?.is_empty());
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate log;

pub mod adapter;
pub mod cache;
pub mod error;
pub mod indexer;
pub mod key;
pub mod observability;
pub mod options;
pub mod serialization;
pub mod store;

// Re-exports for convenience
pub use adapter::{CacheAdapter, DocumentAdapter, FlatAdapter};
pub use cache::{Cache, Loaded};
pub use error::{Error, Result};
pub use key::KeyMapper;
pub use options::{CacheOptions, DocumentOptions, SerializerKind};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
