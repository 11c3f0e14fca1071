//! Cache adapter over a document store with native tag support.

use super::{effective_ttl, CacheAdapter};
use crate::error::{Error, Result};
use crate::key::KeyMapper;
use crate::options::CacheOptions;
use crate::store::{Document, DocumentStore};
use chrono::Utc;
use std::collections::HashSet;
use std::time::Duration;

/// Adapter storing each entry as one document carrying its own tags.
///
/// Expiry is delegated to the store's TTL index; reads also check the
/// timestamp since background eviction lags behind it.
#[derive(Clone)]
pub struct DocumentAdapter<D: DocumentStore> {
    store: D,
    mapper: KeyMapper,
    tag_enable: bool,
}

impl<D: DocumentStore> DocumentAdapter<D> {
    /// Create the adapter and make sure the unique key and TTL indexes
    /// exist.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` for overlapping prefixes, or `Err` if
    /// the indexes cannot be created.
    pub async fn new(store: D, options: &CacheOptions) -> Result<Self> {
        let mapper = KeyMapper::from_options(options)?;
        ensure_indexes(&store).await?;

        info!(
            "✓ DocumentAdapter initialized (keys: {}, tagging: {})",
            mapper.key_prefix(),
            options.tag_enable
        );
        Ok(DocumentAdapter {
            store,
            mapper,
            tag_enable: options.tag_enable,
        })
    }

    pub fn store(&self) -> &D {
        &self.store
    }

    /// Number of documents in the cache collection, expired ones included
    /// until the store evicts them.
    pub async fn count(&self) -> Result<u64> {
        self.store.count().await
    }
}

async fn ensure_indexes<D: DocumentStore>(store: &D) -> Result<()> {
    store.ensure_unique_key_index().await?;
    store.ensure_ttl_index().await
}

impl<D: DocumentStore> CacheAdapter for DocumentAdapter<D> {
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
        let mut doc = Document::new(key.clone(), data);

        if self.tag_enable && !tags.is_empty() {
            let mut mapped: Vec<String> = Vec::with_capacity(tags.len());
            for tag in tags {
                let tag = self.mapper.map_tag(tag);
                if !mapped.contains(&tag) {
                    mapped.push(tag);
                }
            }
            doc = doc.with_tags(mapped);
        }

        if let Some(ttl) = effective_ttl(ttl) {
            let ttl = chrono::Duration::from_std(ttl)
                .map_err(|e| Error::Other(format!("TTL out of range: {}", e)))?;
            doc = doc.with_expire(Utc::now() + ttl);
        }

        let replaced = self.store.upsert(doc).await?;
        debug!(
            "✓ DocumentAdapter SAVE {} ({})",
            key,
            if replaced { "replaced" } else { "inserted" }
        );
        Ok(true)
    }

    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let key = self.mapper.map_key(key);
        Ok(self
            .store
            .find_one(&key)
            .await?
            .filter(|doc| !doc.is_expired_at(Utc::now()))
            .map(|doc| doc.data))
    }

    async fn load_tag(&self, tag: &str) -> Result<Vec<String>> {
        if !self.tag_enable {
            return Ok(Vec::new());
        }
        self.store
            .find_keys_by_tag(&self.mapper.map_tag(tag))
            .await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let key = self.mapper.map_key(key);
        let removed = self.store.delete_one(&key).await?;
        debug!("✓ DocumentAdapter DELETE {} ({} removed)", key, removed);
        Ok(true)
    }

    async fn clean(&self, tags: &[&str]) -> Result<bool> {
        if !self.tag_enable {
            return Ok(true);
        }

        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        for tag in tags {
            for key in self.load_tag(tag).await? {
                if seen.insert(key.clone()) {
                    keys.push(key);
                }
            }
        }
        if keys.is_empty() {
            return Ok(true);
        }

        let removed = self.store.delete_many(&keys).await?;
        debug!(
            "✓ DocumentAdapter CLEAN {:?} -> {} of {} documents",
            tags,
            removed,
            keys.len()
        );
        Ok(true)
    }

    async fn flush(&self, all: bool) -> Result<bool> {
        if all {
            self.store.drop_database().await?;
            // The drop takes the indexes with it.
            ensure_indexes(&self.store).await?;
            return Ok(true);
        }

        let removed = self
            .store
            .delete_by_key_prefix(self.mapper.key_prefix())
            .await?;
        debug!("✓ DocumentAdapter FLUSH {} documents", removed);
        Ok(true)
    }
}
