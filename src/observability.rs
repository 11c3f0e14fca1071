//! Metrics hooks and TTL policies for the [`Cache`](crate::cache::Cache)
//! facade.
//!
//! # Metrics
//!
//! Implement [`CacheMetrics`] to feed your monitoring system; every method
//! has a default that logs through the `log` crate:
//!
//! ```
//! use tagcache::observability::CacheMetrics;
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use std::time::Duration;
//!
//! #[derive(Default)]
//! struct HitCounter(AtomicU64);
//!
//! impl CacheMetrics for HitCounter {
//!     fn record_hit(&self, _key: &str, _duration: Duration) {
//!         self.0.fetch_add(1, Ordering::Relaxed);
//!     }
//! }
//! ```
//!
//! # TTL policies
//!
//! | Policy | Entries saved without an explicit TTL |
//! |--------|---------------------------------------|
//! | `Default` | never expire (the adapter's default) |
//! | `Fixed` | expire after the same duration |
//! | `Infinite` | never expire |
//! | `PerKey` | expire after a duration chosen from the logical key |
//!
//! An explicit TTL passed to `save_*` always wins over the policy.

use std::time::Duration;

/// Hooks called by the cache facade after each operation.
pub trait CacheMetrics: Send + Sync {
    fn record_hit(&self, key: &str, duration: Duration) {
        debug!("Cache HIT: {} took {:?}", key, duration);
    }

    fn record_miss(&self, key: &str, duration: Duration) {
        debug!("Cache MISS: {} took {:?}", key, duration);
    }

    fn record_set(&self, key: &str, duration: Duration) {
        debug!("Cache SET: {} took {:?}", key, duration);
    }

    fn record_delete(&self, key: &str, duration: Duration) {
        debug!("Cache DELETE: {} took {:?}", key, duration);
    }

    /// `tags` is empty for a flush.
    fn record_clean(&self, tags: &[&str], duration: Duration) {
        debug!("Cache CLEAN: {:?} took {:?}", tags, duration);
    }

    /// Called for `Err` results and for `Ok(false)` partial failures.
    fn record_error(&self, key: &str, error: &str) {
        warn!("Cache ERROR for {}: {}", key, error);
    }
}

/// Metrics sink that records nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {
    fn record_hit(&self, _key: &str, _duration: Duration) {}
    fn record_miss(&self, _key: &str, _duration: Duration) {}
    fn record_set(&self, _key: &str, _duration: Duration) {}
    fn record_delete(&self, _key: &str, _duration: Duration) {}
    fn record_clean(&self, _tags: &[&str], _duration: Duration) {}
    fn record_error(&self, _key: &str, _error: &str) {}
}

/// Lifetime applied to entries saved without an explicit TTL.
#[derive(Clone, Debug, Default)]
pub enum TtlPolicy {
    #[default]
    Default,

    Fixed(Duration),

    Infinite,

    /// Chosen from the logical key, e.g. by its `user:`/`session:` prefix.
    PerKey(fn(&str) -> Duration),
}

impl TtlPolicy {
    /// TTL to use for `key` when the caller passed none.
    pub fn get_ttl(&self, key: &str) -> Option<Duration> {
        match self {
            TtlPolicy::Default | TtlPolicy::Infinite => None,
            TtlPolicy::Fixed(d) => Some(*d),
            TtlPolicy::PerKey(f) => Some(f(key)),
        }
    }

    /// Combine an explicit TTL with the policy. An explicit TTL wins.
    pub fn resolve(&self, key: &str, explicit: Option<Duration>) -> Option<Duration> {
        explicit.or_else(|| self.get_ttl(key))
    }
}
