//! In-memory flat store (default, thread-safe, async).
//!
//! Models an in-process shared key/value segment: one flat namespace that
//! every handle cloned from the same store sees. Uses DashMap for
//! lock-free concurrent access with per-key sharding and handles TTL
//! expiration on access.

use super::{EntryInfo, FlatStore, ScanPage, StoreWrite};
use crate::error::Result;
use dashmap::DashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Stored value with optional expiration.
struct StoredValue {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn new(data: Vec<u8>, ttl: Option<Duration>) -> Self {
        // A zero TTL means "no expiry", as in the adapters.
        let expires_at = ttl.filter(|d| !d.is_zero()).map(|d| Instant::now() + d);
        StoredValue { data, expires_at }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() > exp)
    }
}

/// Thread-safe async in-memory flat store.
///
/// Optionally bounded: once `max_entries` live keys exist, writes of new
/// keys are refused (the per-entry flag of [`FlatStore::mset`] is
/// `false`), the way a full shared-memory segment refuses stores.
///
/// # Example
///
/// ```no_run
/// use tagcache::store::{FlatStore, InMemoryStore};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemoryStore::new();
///
///     store.set("key1", b"value".to_vec(), None).await?;
///     assert!(store.get("key1").await?.is_some());
///
///     store.set("key2", b"expires".to_vec(), Some(Duration::from_secs(300))).await?;
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct InMemoryStore {
    entries: Arc<DashMap<String, StoredValue>>,
    max_entries: Option<usize>,
}

impl InMemoryStore {
    /// Create a new unbounded store.
    pub fn new() -> Self {
        InMemoryStore {
            entries: Arc::new(DashMap::new()),
            max_entries: None,
        }
    }

    /// Create a store that refuses new keys beyond `max_entries`.
    pub fn with_max_entries(max_entries: usize) -> Self {
        InMemoryStore {
            entries: Arc::new(DashMap::new()),
            max_entries: Some(max_entries),
        }
    }

    /// Number of stored entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get memory statistics.
    pub fn stats(&self) -> StoreStats {
        let total_bytes: usize = self.entries.iter().map(|entry| entry.data.len()).sum();
        let expired_count = self.entries.iter().filter(|entry| entry.is_expired()).count();

        StoreStats {
            total_entries: self.entries.len(),
            expired_entries: expired_count,
            total_bytes,
        }
    }

    fn has_room_for(&self, key: &str) -> bool {
        match self.max_entries {
            Some(max) => self.entries.contains_key(key) || self.entries.len() < max,
            None => true,
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FlatStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                debug!("✓ InMemory GET {} -> HIT", key);
                return Ok(Some(entry.data.clone()));
            }
        }

        // Drop the expired entry, if any; `remove_if` re-checks under the
        // shard lock so a fresh write racing with us survives.
        self.entries.remove_if(key, |_, entry| entry.is_expired());
        debug!("✓ InMemory GET {} -> MISS", key);
        Ok(None)
    }

    async fn mset(&self, entries: Vec<StoreWrite>) -> Result<Vec<bool>> {
        let count = entries.len();
        let results: Vec<bool> = entries
            .into_iter()
            .map(|write| {
                if !self.has_room_for(&write.key) {
                    warn!("⚠ InMemory SET {} refused: store is full", write.key);
                    return false;
                }
                let value = StoredValue::new(write.value, write.ttl);
                self.entries.insert(write.key, value);
                true
            })
            .collect();

        debug!("✓ InMemory MSET {} keys", count);
        Ok(results)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        debug!("✓ InMemory DELETE {}", key);
        Ok(())
    }

    async fn scan(&self, prefix: &str, cursor: u64, count: usize) -> Result<ScanPage> {
        // Keys are visited in hash order and the cursor is the next hash to
        // visit, so deleting keys mid-scan never shifts the remaining ones.
        let mut matching: Vec<(u64, String)> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix) && !entry.is_expired())
            .map(|entry| (scan_hash(entry.key()), entry.key().clone()))
            .filter(|(hash, _)| *hash >= cursor)
            .collect();
        matching.sort_unstable();

        let count = count.max(1);
        if matching.len() <= count {
            return Ok(ScanPage {
                cursor: 0,
                keys: matching.into_iter().map(|(_, key)| key).collect(),
            });
        }

        // Never split keys sharing a hash across two pages.
        let boundary = matching[count - 1].0;
        let split = matching.partition_point(|(hash, _)| *hash <= boundary);
        let next = if split < matching.len() { boundary + 1 } else { 0 };
        matching.truncate(split);

        Ok(ScanPage {
            cursor: next,
            keys: matching.into_iter().map(|(_, key)| key).collect(),
        })
    }

    async fn clear(&self) -> Result<()> {
        self.entries.clear();
        warn!("⚠ InMemory CLEAR executed - whole namespace cleared!");
        Ok(())
    }

    async fn info(&self, key: &str) -> Result<Option<EntryInfo>> {
        Ok(self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| EntryInfo {
                key: key.to_string(),
                size: entry.data.len(),
                ttl: entry
                    .expires_at
                    .map(|exp| exp.saturating_duration_since(Instant::now())),
            }))
    }
}

fn scan_hash(key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

/// Store statistics.
#[derive(Clone, Debug)]
pub struct StoreStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub total_bytes: usize,
}
