//! Reverse tag index for flat stores.
//!
//! A flat store cannot answer "which keys carry tag X", so every tag gets
//! an ordinary entry under its namespaced tag key holding the set of
//! member keys, encoded as a JSON array of strings.
//!
//! Updates are read-modify-write across two round trips. Two writers
//! tagging different keys with the same tag at the same moment can lose
//! one of the additions; the index may also keep keys that were deleted
//! or expired until the next `delete`/`clean` pass touches it.

use crate::error::{Error, Result};
use crate::store::FlatStore;

/// Decode a stored member set. Undecodable content counts as empty.
pub(crate) fn decode_members(tag_key: &str, bytes: &[u8]) -> Vec<String> {
    match serde_json::from_slice(bytes) {
        Ok(members) => members,
        Err(e) => {
            warn!("⚠ Ignoring unreadable tag index {}: {}", tag_key, e);
            Vec::new()
        }
    }
}

pub(crate) fn encode_members(members: &[String]) -> Result<Vec<u8>> {
    serde_json::to_vec(members).map_err(|e| Error::SerializationError(e.to_string()))
}

/// Add a member, keeping insertion order. Returns false if already present.
pub(crate) fn insert_member(members: &mut Vec<String>, key: &str) -> bool {
    if members.iter().any(|m| m == key) {
        return false;
    }
    members.push(key.to_string());
    true
}

/// Handle on the member set of one tag.
///
/// Holds no data itself: every [`TagIndexer::load`] reads the current set
/// from the store, so a handle can be kept and re-read at will.
#[derive(Clone)]
pub struct TagIndexer<S: FlatStore> {
    store: S,
    name: String,
}

impl<S: FlatStore> TagIndexer<S> {
    /// Bind to the index stored under `name` (an already namespaced tag key).
    pub fn new(store: S, name: impl Into<String>) -> Self {
        TagIndexer {
            store,
            name: name.into(),
        }
    }

    /// The backend key of this index.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read the member keys. `None` if the index does not exist.
    ///
    /// # Errors
    /// Returns `Err` if the store is unreachable.
    pub async fn load(&self) -> Result<Option<Vec<String>>> {
        Ok(self
            .store
            .get(&self.name)
            .await?
            .map(|bytes| decode_members(&self.name, &bytes)))
    }

    /// Add member keys, creating the index if needed.
    ///
    /// # Errors
    /// Returns `Err` if the store is unreachable.
    pub async fn add(&self, keys: &[String]) -> Result<bool> {
        let mut members = self.load().await?.unwrap_or_default();
        let mut changed = false;
        for key in keys {
            changed |= insert_member(&mut members, key);
        }
        if !changed {
            return Ok(true);
        }
        self.store
            .set(&self.name, encode_members(&members)?, None)
            .await
    }

    /// Remove member keys; the index is deleted once it is empty.
    ///
    /// # Errors
    /// Returns `Err` if the store is unreachable.
    pub async fn remove(&self, keys: &[String]) -> Result<bool> {
        let mut members = match self.load().await? {
            Some(members) => members,
            None => return Ok(true),
        };
        let before = members.len();
        members.retain(|m| !keys.contains(m));

        if members.is_empty() {
            self.purge().await?;
            Ok(true)
        } else if members.len() == before {
            Ok(true)
        } else {
            self.store
                .set(&self.name, encode_members(&members)?, None)
                .await
        }
    }

    /// Delete the index entry itself.
    ///
    /// # Errors
    /// Returns `Err` if the store is unreachable.
    pub async fn purge(&self) -> Result<()> {
        self.store.delete(&self.name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_insert_member_deduplicates() {
        let mut members = keys(&["a"]);
        assert!(insert_member(&mut members, "b"));
        assert!(!insert_member(&mut members, "a"));
        assert_eq!(members, keys(&["a", "b"]));
    }

    #[test]
    fn test_decode_garbage_is_empty() {
        assert!(decode_members("t", b"\x00\x01garbage").is_empty());
        assert_eq!(decode_members("t", br#"["x","y"]"#), keys(&["x", "y"]));
    }

    #[tokio::test]
    async fn test_load_missing_index() {
        let indexer = TagIndexer::new(InMemoryStore::new(), "t:users");
        assert_eq!(indexer.load().await.expect("Failed to load"), None);
    }

    #[tokio::test]
    async fn test_add_remove_purge() {
        let store = InMemoryStore::new();
        let indexer = TagIndexer::new(store.clone(), "t:users");

        assert!(indexer
            .add(&keys(&["k:1", "k:2", "k:1"]))
            .await
            .expect("Failed to add"));
        assert_eq!(
            indexer.load().await.expect("Failed to load"),
            Some(keys(&["k:1", "k:2"]))
        );

        assert!(indexer
            .remove(&keys(&["k:1"]))
            .await
            .expect("Failed to remove"));
        assert_eq!(
            indexer.load().await.expect("Failed to load"),
            Some(keys(&["k:2"]))
        );

        assert!(indexer
            .remove(&keys(&["k:2"]))
            .await
            .expect("Failed to remove"));
        assert_eq!(indexer.load().await.expect("Failed to load"), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_load_is_restartable() {
        let store = InMemoryStore::new();
        let indexer = TagIndexer::new(store.clone(), "t:users");

        indexer
            .add(&keys(&["k:1"]))
            .await
            .expect("Failed to add");
        let first = indexer.load().await.expect("Failed to load");

        // A write through another handle is visible on the next read.
        TagIndexer::new(store, "t:users")
            .add(&keys(&["k:2"]))
            .await
            .expect("Failed to add");
        let second = indexer.load().await.expect("Failed to load");

        assert_eq!(first, Some(keys(&["k:1"])));
        assert_eq!(second, Some(keys(&["k:1", "k:2"])));
    }
}
