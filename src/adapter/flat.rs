//! Cache adapter over a flat key/value store, with emulated tags.
//!
//! Data entries and tag indexes share one namespace, kept apart by the
//! disjoint key and tag prefixes of the [`KeyMapper`]:
//!
//! ```text
//! tagcache-key:user:1  ->  <payload>
//! tagcache-key:user:2  ->  <payload>
//! tagcache-tag:users   ->  ["tagcache-key:user:1","tagcache-key:user:2"]
//! ```
//!
//! Tag indexes are maintained by read-modify-write and are not atomic
//! across keys: concurrent `save`s naming the same tag may drop one of the
//! memberships. See [`crate::indexer`].

use super::{effective_ttl, CacheAdapter};
use crate::error::Result;
use crate::indexer::{decode_members, encode_members, insert_member, TagIndexer};
use crate::key::KeyMapper;
use crate::options::CacheOptions;
use crate::store::{scan_entries, scan_keys, EntryInfo, FlatStore, StoreWrite};
use futures::TryStreamExt;
use std::pin::pin;
use std::time::Duration;

/// Tag-emulating adapter for [`FlatStore`] backends.
///
/// # Example
///
/// ```
/// use tagcache::adapter::{CacheAdapter, FlatAdapter};
/// use tagcache::options::CacheOptions;
/// use tagcache::store::InMemoryStore;
///
/// # #[tokio::main]
/// # async fn main() -> tagcache::Result<()> {
/// let cache = FlatAdapter::new(InMemoryStore::new(), &CacheOptions::default())?;
///
/// cache.save(b"v1".to_vec(), "user:1", &["users"], None).await?;
/// cache.save(b"v2".to_vec(), "user:2", &["users"], None).await?;
/// assert_eq!(cache.load_tag("users").await?.len(), 2);
///
/// cache.clean(&["users"]).await?;
/// assert!(cache.load("user:1").await?.is_none());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct FlatAdapter<S: FlatStore> {
    store: S,
    mapper: KeyMapper,
    tag_enable: bool,
}

impl<S: FlatStore> FlatAdapter<S> {
    /// Create an adapter owning `store`.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if the prefixes in `options` overlap.
    pub fn new(store: S, options: &CacheOptions) -> Result<Self> {
        let mapper = KeyMapper::from_options(options)?;
        info!(
            "✓ FlatAdapter initialized (keys: {}, tags: {}, tagging: {})",
            mapper.key_prefix(),
            mapper.tag_prefix(),
            options.tag_enable
        );
        Ok(FlatAdapter {
            store,
            mapper,
            tag_enable: options.tag_enable,
        })
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Handle on the member set of a logical tag.
    pub fn tag_index(&self, tag: &str) -> TagIndexer<S> {
        TagIndexer::new(self.store.clone(), self.mapper.map_tag(tag))
    }

    /// Backend metadata for a logical key. Diagnostic only.
    ///
    /// # Errors
    /// Returns `Err` if the store is unreachable.
    pub async fn internal_info(&self, key: &str) -> Result<Option<EntryInfo>> {
        self.store.info(&self.mapper.map_key(key)).await
    }

    /// Delete every key under `prefix`, attempting all of them.
    async fn delete_prefix(&self, prefix: &str) -> Result<(usize, bool)> {
        let mut removed = 0;
        let mut ok = true;
        let mut keys = pin!(scan_keys(&self.store, prefix));
        while let Some(key) = keys.try_next().await? {
            match self.store.delete(&key).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!("⚠ FlatAdapter FLUSH could not delete {}: {}", key, e);
                    ok = false;
                }
            }
        }
        Ok((removed, ok))
    }

    /// Remove `key` from every tag index except those named in `keep`.
    ///
    /// No reverse lookup from key to tags exists, so this walks every tag
    /// index. Emptied indexes are deleted. A failing index write is logged
    /// and the walk goes on; the returned flag is false if any failed.
    async fn untag(&self, key: &str, keep: &[String]) -> Result<(usize, bool)> {
        let mut ok = true;
        let mut touched = 0;
        let mut indexes = pin!(scan_entries(&self.store, self.mapper.tag_prefix()));
        while let Some((tag_key, bytes)) = indexes.try_next().await? {
            if keep.contains(&tag_key) {
                continue;
            }
            let mut members = decode_members(&tag_key, &bytes);
            let before = members.len();
            members.retain(|member| member != key);
            if members.len() == before {
                continue;
            }

            touched += 1;
            let written = if members.is_empty() {
                self.store.delete(&tag_key).await.map(|()| true)
            } else {
                match encode_members(&members) {
                    Ok(bytes) => self.store.set(&tag_key, bytes, None).await,
                    Err(e) => Err(e),
                }
            };
            match written {
                Ok(true) => {}
                Ok(false) => {
                    warn!("⚠ FlatAdapter could not rewrite index {}", tag_key);
                    ok = false;
                }
                Err(e) => {
                    warn!("⚠ FlatAdapter could not update index {}: {}", tag_key, e);
                    ok = false;
                }
            }
        }
        Ok((touched, ok))
    }
}

impl<S: FlatStore> CacheAdapter for FlatAdapter<S> {
    fn key_mapper(&self) -> &KeyMapper {
        &self.mapper
    }

    fn tags_enabled(&self) -> bool {
        self.tag_enable
    }

    async fn save(
        &self,
        data: Vec<u8>,
        key: &str,
        tags: &[&str],
        ttl: Option<Duration>,
    ) -> Result<bool> {
        let key = self.mapper.map_key(key);

        let mut untag_ok = true;
        let mut writes = Vec::with_capacity(tags.len() + 1);
        if self.tag_enable {
            let mut tag_keys: Vec<String> = Vec::with_capacity(tags.len());
            for tag in tags {
                insert_member(&mut tag_keys, &self.mapper.map_tag(tag));
            }

            // A save replaces the entry, tags included: drop memberships
            // the key no longer has.
            let (_, ok) = self.untag(&key, &tag_keys).await?;
            untag_ok = ok;

            for tag_key in tag_keys {
                let mut members = match self.store.get(&tag_key).await? {
                    Some(bytes) => decode_members(&tag_key, &bytes),
                    None => Vec::new(),
                };
                insert_member(&mut members, &key);
                writes.push(StoreWrite::new(tag_key, encode_members(&members)?, None));
            }
        }
        writes.push(StoreWrite::new(key.clone(), data, effective_ttl(ttl)));

        let results = self.store.mset(writes).await?;
        let ok = results.iter().all(|ok| *ok);
        if ok {
            debug!("✓ FlatAdapter SAVE {} ({} tags)", key, results.len() - 1);
        } else {
            warn!(
                "⚠ FlatAdapter SAVE {}: {} of {} writes failed",
                key,
                results.iter().filter(|ok| !**ok).count(),
                results.len()
            );
        }
        Ok(ok && untag_ok)
    }

    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.store.get(&self.mapper.map_key(key)).await
    }

    async fn load_tag(&self, tag: &str) -> Result<Vec<String>> {
        if !self.tag_enable {
            return Ok(Vec::new());
        }
        Ok(self.tag_index(tag).load().await?.unwrap_or_default())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let key = self.mapper.map_key(key);
        self.store.delete(&key).await?;

        if !self.tag_enable {
            debug!("✓ FlatAdapter DELETE {}", key);
            return Ok(true);
        }

        let (touched, ok) = self.untag(&key, &[]).await?;
        debug!("✓ FlatAdapter DELETE {} (untagged from {})", key, touched);
        Ok(ok)
    }

    async fn clean(&self, tags: &[&str]) -> Result<bool> {
        if !self.tag_enable {
            return Ok(true);
        }

        let mut ok = true;
        for tag in tags {
            let index = self.tag_index(tag);
            let members = match index.load().await? {
                Some(members) => members,
                None => {
                    debug!("✓ FlatAdapter CLEAN {} -> no index", index.name());
                    continue;
                }
            };

            for member in &members {
                if let Err(e) = self.store.delete(member).await {
                    warn!("⚠ FlatAdapter CLEAN could not delete {}: {}", member, e);
                    ok = false;
                }
            }
            if let Err(e) = index.purge().await {
                warn!("⚠ FlatAdapter CLEAN could not delete {}: {}", index.name(), e);
                ok = false;
            }

            debug!(
                "✓ FlatAdapter CLEAN {} -> {} keys",
                index.name(),
                members.len()
            );
        }
        Ok(ok)
    }

    async fn flush(&self, all: bool) -> Result<bool> {
        if all {
            self.store.clear().await?;
            return Ok(true);
        }

        let (keys, keys_ok) = self.delete_prefix(self.mapper.key_prefix()).await?;
        let (tags, tags_ok) = self.delete_prefix(self.mapper.tag_prefix()).await?;

        debug!("✓ FlatAdapter FLUSH {} keys, {} tags", keys, tags);
        Ok(keys_ok && tags_ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::store::{InMemoryStore, ScanPage};

    /// In-memory store refusing every write or delete of one key.
    #[derive(Clone)]
    struct FailingStore {
        inner: InMemoryStore,
        poisoned: String,
    }

    impl FailingStore {
        fn check(&self, key: &str) -> Result<()> {
            if key == self.poisoned {
                return Err(Error::BackendError(format!("{} is unavailable", key)));
            }
            Ok(())
        }
    }

    impl FlatStore for FailingStore {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            self.inner.get(key).await
        }

        async fn mset(&self, entries: Vec<StoreWrite>) -> Result<Vec<bool>> {
            for entry in &entries {
                self.check(&entry.key)?;
            }
            self.inner.mset(entries).await
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.check(key)?;
            self.inner.delete(key).await
        }

        async fn scan(&self, prefix: &str, cursor: u64, count: usize) -> Result<ScanPage> {
            self.inner.scan(prefix, cursor, count).await
        }

        async fn clear(&self) -> Result<()> {
            self.inner.clear().await
        }
    }

    fn adapter() -> FlatAdapter<InMemoryStore> {
        FlatAdapter::new(InMemoryStore::new(), &CacheOptions::default())
            .expect("Failed to create adapter")
    }

    #[tokio::test]
    async fn test_save_writes_index_and_data() {
        let cache = adapter();

        assert!(cache
            .save(b"v1".to_vec(), "user:1", &["users", "admins"], None)
            .await
            .expect("Failed to save"));

        let key = cache.key_mapper().map_key("user:1");
        assert_eq!(
            cache.load_tag("users").await.expect("Failed to load tag"),
            vec![key.clone()]
        );
        assert_eq!(
            cache.load_tag("admins").await.expect("Failed to load tag"),
            vec![key]
        );
        assert_eq!(cache.store().len(), 3);
    }

    #[tokio::test]
    async fn test_resave_does_not_duplicate_membership() {
        let cache = adapter();

        for _ in 0..3 {
            cache
                .save(b"v".to_vec(), "user:1", &["users"], None)
                .await
                .expect("Failed to save");
        }

        assert_eq!(
            cache
                .load_tag("users")
                .await
                .expect("Failed to load tag")
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_save_reports_partial_failure() {
        // Room for the tag index but not for the data entry.
        let store = InMemoryStore::with_max_entries(1);
        let cache = FlatAdapter::new(store.clone(), &CacheOptions::default())
            .expect("Failed to create adapter");

        let ok = cache
            .save(b"v".to_vec(), "user:1", &["users"], None)
            .await
            .expect("Failed to save");

        assert!(!ok);
        // No rollback of the write that went through.
        assert_eq!(
            cache
                .load_tag("users")
                .await
                .expect("Failed to load tag")
                .len(),
            1
        );
        assert!(cache.load("user:1").await.expect("Failed to load").is_none());
    }

    #[tokio::test]
    async fn test_delete_prunes_indexes() {
        let cache = adapter();
        cache
            .save(b"v1".to_vec(), "user:1", &["users", "solo"], None)
            .await
            .expect("Failed to save");
        cache
            .save(b"v2".to_vec(), "user:2", &["users"], None)
            .await
            .expect("Failed to save");

        assert!(cache.delete("user:1").await.expect("Failed to delete"));

        assert_eq!(
            cache.load_tag("users").await.expect("Failed to load tag"),
            vec![cache.key_mapper().map_key("user:2")]
        );
        // The emptied index is gone entirely.
        assert!(cache
            .tag_index("solo")
            .load()
            .await
            .expect("Failed to load index")
            .is_none());
    }

    #[tokio::test]
    async fn test_delete_keeps_pruning_after_index_failure() {
        let options = CacheOptions::default();
        let mapper = KeyMapper::from_options(&options).expect("Failed to create mapper");
        let store = FailingStore {
            inner: InMemoryStore::new(),
            poisoned: mapper.map_tag("shared"),
        };
        let cache = FlatAdapter::new(store.clone(), &options).expect("Failed to create adapter");

        // The poisoned index must be created before the store refuses it.
        store
            .inner
            .set(
                &mapper.map_tag("shared"),
                encode_members(&[mapper.map_key("k"), mapper.map_key("other")])
                    .expect("Failed to encode"),
                None,
            )
            .await
            .expect("Failed to set");
        cache
            .save(b"v".to_vec(), "k", &["solo", "second"], None)
            .await
            .expect("Failed to save");

        let ok = cache.delete("k").await.expect("Failed to delete");

        assert!(!ok);
        assert!(cache.load("k").await.expect("Failed to load").is_none());
        assert!(cache
            .load_tag("solo")
            .await
            .expect("Failed to load tag")
            .is_empty());
        assert!(cache
            .load_tag("second")
            .await
            .expect("Failed to load tag")
            .is_empty());
        // The refused index still lists the key.
        assert_eq!(
            cache
                .load_tag("shared")
                .await
                .expect("Failed to load tag")
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn test_resave_moves_key_between_indexes() {
        let cache = adapter();
        cache
            .save(b"v1".to_vec(), "k", &["old", "kept"], None)
            .await
            .expect("Failed to save");
        cache
            .save(b"v2".to_vec(), "other", &["old"], None)
            .await
            .expect("Failed to save");

        assert!(cache
            .save(b"v3".to_vec(), "k", &["kept", "new"], None)
            .await
            .expect("Failed to save"));

        let key = cache.key_mapper().map_key("k");
        assert_eq!(
            cache.load_tag("old").await.expect("Failed to load tag"),
            vec![cache.key_mapper().map_key("other")]
        );
        assert_eq!(
            cache.load_tag("kept").await.expect("Failed to load tag"),
            vec![key.clone()]
        );
        assert_eq!(
            cache.load_tag("new").await.expect("Failed to load tag"),
            vec![key]
        );

        // Resaving without tags drops the last memberships.
        cache
            .save(b"v4".to_vec(), "k", &[], None)
            .await
            .expect("Failed to save");
        assert!(cache
            .tag_index("kept")
            .load()
            .await
            .expect("Failed to load index")
            .is_none());
    }

    #[tokio::test]
    async fn test_clean_unknown_tag_succeeds() {
        let cache = adapter();
        assert!(cache.clean(&["never-used"]).await.expect("Failed to clean"));
    }

    #[tokio::test]
    async fn test_clean_with_stale_member() {
        let cache = adapter();
        cache
            .save(b"v1".to_vec(), "user:1", &["users"], None)
            .await
            .expect("Failed to save");

        // Remove the data behind the adapter's back: the index is now stale.
        let key = cache.key_mapper().map_key("user:1");
        cache.store().delete(&key).await.expect("Failed to delete");

        assert!(cache.clean(&["users"]).await.expect("Failed to clean"));
        assert!(cache.store().is_empty());
    }

    #[tokio::test]
    async fn test_tags_disabled() {
        let options = CacheOptions::default().with_tags(false);
        let cache = FlatAdapter::new(InMemoryStore::new(), &options)
            .expect("Failed to create adapter");

        cache
            .save(b"v1".to_vec(), "user:1", &["users"], None)
            .await
            .expect("Failed to save");

        assert_eq!(cache.store().len(), 1);
        assert!(cache
            .load_tag("users")
            .await
            .expect("Failed to load tag")
            .is_empty());
        assert!(cache.clean(&["users"]).await.expect("Failed to clean"));
        assert!(cache
            .load("user:1")
            .await
            .expect("Failed to load")
            .is_some());
    }

    #[tokio::test]
    async fn test_internal_info() {
        let cache = adapter();
        cache
            .save(
                b"hello".to_vec(),
                "greeting",
                &[],
                Some(Duration::from_secs(60)),
            )
            .await
            .expect("Failed to save");

        let info = cache
            .internal_info("greeting")
            .await
            .expect("Failed to get info")
            .expect("Entry should exist");
        assert_eq!(info.key, cache.key_mapper().map_key("greeting"));
        assert_eq!(info.size, 5);
        assert!(info.ttl.is_some_and(|ttl| ttl <= Duration::from_secs(60)));

        assert!(cache
            .internal_info("missing")
            .await
            .expect("Failed to get info")
            .is_none());
    }

    #[tokio::test]
    async fn test_flush_all_clears_foreign_entries() {
        let cache = adapter();
        cache
            .save(b"v".to_vec(), "user:1", &["users"], None)
            .await
            .expect("Failed to save");
        cache
            .store()
            .set("foreign:1", b"x".to_vec(), None)
            .await
            .expect("Failed to set");

        assert!(cache.flush(true).await.expect("Failed to flush"));
        assert!(cache.store().is_empty());
    }
}
