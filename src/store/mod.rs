//! Storage primitives the adapters are built on.
//!
//! Two families of backends are supported:
//!
//! - [`FlatStore`]: a single flat key/value namespace with per-key TTL and
//!   a prefix scan. No grouping of keys. Implementations: [`InMemoryStore`]
//!   (default), [`RedisStore`] (feature `redis`).
//! - [`DocumentStore`]: structured documents with a unique key index, an
//!   array field for tags and a TTL index swept by the store itself.
//!   Implementation: [`InMemoryDocumentStore`].

use crate::error::{Error, Result};
use futures::stream::{self, Stream, TryStreamExt};
use std::time::Duration;

pub mod document;
pub mod inmemory;
#[cfg(feature = "redis")]
pub mod redis;

pub use document::{Document, DocumentStore, InMemoryDocumentStore};
pub use inmemory::{InMemoryStore, StoreStats};
#[cfg(feature = "redis")]
pub use redis::{PoolStats, RedisConfig, RedisStore};

/// Number of keys requested per scan round trip.
pub const SCAN_BATCH: usize = 100;

/// One entry of a batched write.
#[derive(Clone, Debug, PartialEq)]
pub struct StoreWrite {
    pub key: String,
    pub value: Vec<u8>,
    pub ttl: Option<Duration>,
}

impl StoreWrite {
    pub fn new(key: impl Into<String>, value: Vec<u8>, ttl: Option<Duration>) -> Self {
        StoreWrite {
            key: key.into(),
            value,
            ttl,
        }
    }
}

/// One page of a prefix scan.
///
/// A `cursor` of `0` means the scan is complete.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScanPage {
    pub cursor: u64,
    pub keys: Vec<String>,
}

/// Backend metadata for a single stored key. Diagnostic only.
#[derive(Clone, Debug, PartialEq)]
pub struct EntryInfo {
    pub key: String,
    pub size: usize,
    /// Remaining time to live; `None` for entries without expiry.
    pub ttl: Option<Duration>,
}

/// Trait for flat key/value stores.
///
/// Single-key operations are atomic; nothing spans several keys.
///
/// **IMPORTANT:** All methods use `&self`. Implementations use interior
/// mutability or external storage, and `Clone` yields another handle to
/// the same namespace.
#[allow(async_fn_in_trait)]
pub trait FlatStore: Send + Sync + Clone {
    /// Retrieve a value. Expired entries are `Ok(None)`.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs (connection lost, etc.)
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store several entries in one batch.
    ///
    /// Returns one success flag per entry, in order. A `false` flag means
    /// the store refused that write; the other writes still happen.
    ///
    /// # Errors
    /// Returns `Err` if the backend is unreachable.
    async fn mset(&self, entries: Vec<StoreWrite>) -> Result<Vec<bool>>;

    /// Store a single entry.
    ///
    /// # Errors
    /// Returns `Err` if the backend is unreachable.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<bool> {
        let results = self.mset(vec![StoreWrite::new(key, value, ttl)]).await?;
        Ok(results.into_iter().all(|ok| ok))
    }

    /// Remove a key. Removing an absent key is not an error.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn delete(&self, key: &str) -> Result<()>;

    /// Return one page of keys starting with `prefix`.
    ///
    /// Start with cursor `0`; continue with the returned cursor until it
    /// is `0` again. Keys written during a scan may or may not be seen.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn scan(&self, prefix: &str, cursor: u64, count: usize) -> Result<ScanPage>;

    /// Remove every key in the namespace, whoever wrote it.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn clear(&self) -> Result<()>;

    /// Backend metadata for one key.
    ///
    /// Default implementation reports the size and no TTL.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn info(&self, key: &str) -> Result<Option<EntryInfo>> {
        Ok(self.get(key).await?.map(|value| EntryInfo {
            key: key.to_string(),
            size: value.len(),
            ttl: None,
        }))
    }
}

/// Lazily scan every key starting with `prefix`.
///
/// Each call starts a fresh pass, so the sequence is restartable; a pass
/// is finite and has no ordering guarantee.
pub fn scan_keys<'a, S: FlatStore>(
    store: &'a S,
    prefix: &'a str,
) -> impl Stream<Item = Result<String>> + 'a {
    stream::try_unfold(Some(0u64), move |cursor| async move {
        let cursor = match cursor {
            Some(cursor) => cursor,
            None => return Ok(None),
        };
        let page = store.scan(prefix, cursor, SCAN_BATCH).await?;
        let next = if page.cursor == 0 {
            None
        } else {
            Some(page.cursor)
        };
        Ok::<_, Error>(Some((page.keys, next)))
    })
    .map_ok(|keys| stream::iter(keys.into_iter().map(Ok)))
    .try_flatten()
}

/// Lazily scan `(key, value)` pairs for every key starting with `prefix`.
///
/// Keys that vanish between the scan and the read are skipped.
pub fn scan_entries<'a, S: FlatStore>(
    store: &'a S,
    prefix: &'a str,
) -> impl Stream<Item = Result<(String, Vec<u8>)>> + 'a {
    scan_keys(store, prefix)
        .and_then(move |key| async move {
            let value = store.get(&key).await?;
            Ok(value.map(|value| (key, value)))
        })
        .try_filter_map(|entry| async move { Ok(entry) })
}
