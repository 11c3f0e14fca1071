//! Cache adapters: one contract over backends with different primitives.
//!
//! | Adapter | Tags | Expiry |
//! |---|---|---|
//! | [`FlatAdapter`] | emulated reverse index per tag | per-key TTL of the store |
//! | [`DocumentAdapter`] | array field on each document | TTL index swept by the store |
//!
//! Both map every logical key and tag through a [`KeyMapper`] before
//! touching storage, and both behave the same from the caller's side.

use crate::error::Result;
use crate::key::KeyMapper;
use std::time::Duration;

pub mod document;
pub mod flat;

pub use document::DocumentAdapter;
pub use flat::FlatAdapter;

/// The contract every cache adapter implements.
///
/// Mutating operations return `Ok(bool)`: `false` means at least one
/// underlying write or removal failed (nothing is rolled back). `Err` is
/// reserved for an unreachable or failing backend and is never retried.
/// A miss is `Ok(None)` or an empty sequence, never an error.
///
/// With tagging disabled, `save` ignores its tags, `load_tag` is empty and
/// `clean` succeeds without touching storage.
#[allow(async_fn_in_trait)]
pub trait CacheAdapter: Send + Sync {
    /// The key/tag namespacing in use.
    fn key_mapper(&self) -> &KeyMapper;

    /// Whether tags are honoured.
    fn tags_enabled(&self) -> bool;

    /// Store `data` under `key`, replacing any previous entry, and register
    /// it under each tag. A `ttl` of `None` or zero means no expiry.
    ///
    /// # Errors
    /// Returns `Err` if the backend is unreachable.
    async fn save(
        &self,
        data: Vec<u8>,
        key: &str,
        tags: &[&str],
        ttl: Option<Duration>,
    ) -> Result<bool>;

    /// Fetch the payload stored under `key`. Expired entries are misses.
    ///
    /// # Errors
    /// Returns `Err` if the backend is unreachable.
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Backend keys currently registered under `tag`; empty if none.
    ///
    /// # Errors
    /// Returns `Err` if the backend is unreachable.
    async fn load_tag(&self, tag: &str) -> Result<Vec<String>>;

    /// Remove `key` and its tag memberships. Removing an absent key
    /// succeeds.
    ///
    /// # Errors
    /// Returns `Err` if the backend is unreachable.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Remove every entry carrying any of `tags`, and the tags themselves.
    ///
    /// Every member is attempted even after a failure.
    ///
    /// # Errors
    /// Returns `Err` if the backend is unreachable.
    async fn clean(&self, tags: &[&str]) -> Result<bool>;

    /// `all = false`: remove entries and tags under this cache's prefixes
    /// only. `all = true`: wipe the whole backend namespace, including data
    /// written by anyone else.
    ///
    /// # Errors
    /// Returns `Err` if the backend is unreachable.
    async fn flush(&self, all: bool) -> Result<bool>;
}

/// A TTL that actually expires: `None` for absent or zero durations.
pub(crate) fn effective_ttl(ttl: Option<Duration>) -> Option<Duration> {
    ttl.filter(|d| !d.is_zero())
}
