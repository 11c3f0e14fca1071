//! Document store: structured records with native tag arrays and TTL.
//!
//! Each cache entry is one document:
//!
//! ```text
//! { key: "tagcache-key:user:1", data: <bytes>, tags: ["tagcache-tag:users"], expire: <instant> }
//! ```
//!
//! The store answers "which documents carry tag X" itself and evicts
//! expired documents in the background once a TTL index exists, so no
//! reverse index has to be emulated.

use crate::error::{Error, Result};
use crate::options::DocumentOptions;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// One cached entry as stored in a document collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub key: String,
    pub data: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire: Option<DateTime<Utc>>,
}

impl Document {
    pub fn new(key: impl Into<String>, data: Vec<u8>) -> Self {
        Document {
            key: key.into(),
            data,
            tags: None,
            expire: None,
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn with_expire(mut self, expire: DateTime<Utc>) -> Self {
        self.expire = Some(expire);
        self
    }

    /// Whether the expiry timestamp lies before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expire.is_some_and(|expire| expire < now)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags
            .as_ref()
            .is_some_and(|tags| tags.iter().any(|t| t == tag))
    }
}

/// Trait for a document collection used as cache storage.
///
/// Every write is atomic per document; there is no multi-document
/// transaction.
#[allow(async_fn_in_trait)]
pub trait DocumentStore: Send + Sync + Clone {
    /// Create (if missing) a unique index on the `key` field.
    ///
    /// # Errors
    /// Returns `Err` if the index cannot be created.
    async fn ensure_unique_key_index(&self) -> Result<()>;

    /// Create (if missing) a TTL index on the `expire` field. Documents
    /// past their expiry are then removed by the store in the background.
    ///
    /// # Errors
    /// Returns `Err` if the index cannot be created.
    async fn ensure_ttl_index(&self) -> Result<()>;

    /// Insert a new document.
    ///
    /// # Errors
    /// Returns `Error::DuplicateKey` if the unique key index already holds
    /// the key.
    async fn insert(&self, doc: Document) -> Result<()>;

    /// Replace the document with the same key, or insert it.
    ///
    /// Returns `true` when an existing document was replaced.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn upsert(&self, doc: Document) -> Result<bool>;

    /// Find a document by key, expired or not.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn find_one(&self, key: &str) -> Result<Option<Document>>;

    /// Keys of every document whose `tags` array contains `tag`.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn find_keys_by_tag(&self, tag: &str) -> Result<Vec<String>>;

    /// Remove the document with this key. Returns the number removed.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn delete_one(&self, key: &str) -> Result<u64>;

    /// Remove every document whose key is in `keys`. Returns the number
    /// removed.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn delete_many(&self, keys: &[String]) -> Result<u64>;

    /// Remove every document whose key starts with `prefix`.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn delete_by_key_prefix(&self, prefix: &str) -> Result<u64>;

    /// Drop the whole database this collection belongs to.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn drop_database(&self) -> Result<()>;

    /// Number of documents in the collection.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn count(&self) -> Result<u64>;
}

#[derive(Default)]
struct Collection {
    next_id: u64,
    docs: BTreeMap<u64, Document>,
    /// Present once the unique key index exists.
    key_index: Option<HashMap<String, u64>>,
    ttl_index: bool,
}

impl Collection {
    fn id_of(&self, key: &str) -> Option<u64> {
        match &self.key_index {
            Some(index) => index.get(key).copied(),
            None => self
                .docs
                .iter()
                .find(|(_, doc)| doc.key == key)
                .map(|(id, _)| *id),
        }
    }

    fn push(&mut self, doc: Document) {
        let id = self.next_id;
        self.next_id += 1;
        if let Some(index) = self.key_index.as_mut() {
            index.insert(doc.key.clone(), id);
        }
        self.docs.insert(id, doc);
    }

    fn remove_where(&mut self, mut pred: impl FnMut(&Document) -> bool) -> u64 {
        let ids: Vec<u64> = self
            .docs
            .iter()
            .filter(|(_, doc)| pred(doc))
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            if let Some(doc) = self.docs.remove(id) {
                if let Some(index) = self.key_index.as_mut() {
                    index.remove(&doc.key);
                }
            }
        }
        ids.len() as u64
    }
}

struct Database {
    name: String,
    collections: RwLock<HashMap<String, Collection>>,
}

impl Database {
    async fn sweep_expired(&self, now: DateTime<Utc>) -> u64 {
        let mut collections = self.collections.write().await;
        collections
            .values_mut()
            .filter(|collection| collection.ttl_index)
            .map(|collection| collection.remove_where(|doc| doc.is_expired_at(now)))
            .sum()
    }
}

/// In-process document store.
///
/// A handle addresses one collection of one database; clones and
/// [`InMemoryDocumentStore::collection`] handles share the database.
#[derive(Clone)]
pub struct InMemoryDocumentStore {
    db: Arc<Database>,
    collection: String,
}

impl InMemoryDocumentStore {
    /// Open the database and collection named in `options`.
    pub fn new(options: &DocumentOptions) -> Self {
        info!(
            "✓ Document store initialized: {}.{}",
            options.db_name, options.collection_name
        );
        InMemoryDocumentStore {
            db: Arc::new(Database {
                name: options.db_name.clone(),
                collections: RwLock::new(HashMap::new()),
            }),
            collection: options.collection_name.clone(),
        }
    }

    /// Handle to another collection of the same database.
    pub fn collection(&self, name: impl Into<String>) -> Self {
        InMemoryDocumentStore {
            db: Arc::clone(&self.db),
            collection: name.into(),
        }
    }

    pub fn db_name(&self) -> &str {
        &self.db.name
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    /// Start the TTL monitor: every `interval`, documents past their
    /// expiry are removed from collections that have a TTL index.
    ///
    /// The task ends once every handle to the store is dropped. Must be
    /// called from within a tokio runtime.
    pub fn start_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let db: Weak<Database> = Arc::downgrade(&self.db);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let db = match db.upgrade() {
                    Some(db) => db,
                    None => break,
                };
                let removed = db.sweep_expired(Utc::now()).await;
                if removed > 0 {
                    debug!("✓ TTL sweep on {} removed {} documents", db.name, removed);
                }
            }
            debug!("TTL sweeper stopped");
        })
    }
}

impl DocumentStore for InMemoryDocumentStore {
    async fn ensure_unique_key_index(&self) -> Result<()> {
        let mut collections = self.db.collections.write().await;
        let collection = collections.entry(self.collection.clone()).or_default();
        if collection.key_index.is_some() {
            return Ok(());
        }

        let mut index = HashMap::with_capacity(collection.docs.len());
        let mut duplicates = Vec::new();
        for (id, doc) in &collection.docs {
            if let Some(older) = index.insert(doc.key.clone(), *id) {
                duplicates.push(older);
            }
        }
        // Building a unique index over duplicates keeps the newest copy.
        for id in duplicates {
            collection.docs.remove(&id);
        }
        collection.key_index = Some(index);

        debug!("✓ Unique index on key for {}.{}", self.db.name, self.collection);
        Ok(())
    }

    async fn ensure_ttl_index(&self) -> Result<()> {
        let mut collections = self.db.collections.write().await;
        collections
            .entry(self.collection.clone())
            .or_default()
            .ttl_index = true;

        debug!("✓ TTL index on expire for {}.{}", self.db.name, self.collection);
        Ok(())
    }

    async fn insert(&self, doc: Document) -> Result<()> {
        let mut collections = self.db.collections.write().await;
        let collection = collections.entry(self.collection.clone()).or_default();

        if collection
            .key_index
            .as_ref()
            .is_some_and(|index| index.contains_key(&doc.key))
        {
            return Err(Error::DuplicateKey(doc.key));
        }
        collection.push(doc);
        Ok(())
    }

    async fn upsert(&self, doc: Document) -> Result<bool> {
        let mut collections = self.db.collections.write().await;
        let collection = collections.entry(self.collection.clone()).or_default();

        match collection.id_of(&doc.key) {
            Some(id) => {
                collection.docs.insert(id, doc);
                Ok(true)
            }
            None => {
                collection.push(doc);
                Ok(false)
            }
        }
    }

    async fn find_one(&self, key: &str) -> Result<Option<Document>> {
        let collections = self.db.collections.read().await;
        Ok(collections.get(&self.collection).and_then(|collection| {
            collection
                .id_of(key)
                .and_then(|id| collection.docs.get(&id))
                .cloned()
        }))
    }

    async fn find_keys_by_tag(&self, tag: &str) -> Result<Vec<String>> {
        let collections = self.db.collections.read().await;
        Ok(collections
            .get(&self.collection)
            .map(|collection| {
                collection
                    .docs
                    .values()
                    .filter(|doc| doc.has_tag(tag))
                    .map(|doc| doc.key.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_one(&self, key: &str) -> Result<u64> {
        let mut collections = self.db.collections.write().await;
        Ok(match collections.get_mut(&self.collection) {
            Some(collection) => collection.remove_where(|doc| doc.key == key).min(1),
            None => 0,
        })
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64> {
        let mut collections = self.db.collections.write().await;
        Ok(match collections.get_mut(&self.collection) {
            Some(collection) => {
                let keys: HashSet<&str> = keys.iter().map(String::as_str).collect();
                collection.remove_where(|doc| keys.contains(doc.key.as_str()))
            }
            None => 0,
        })
    }

    async fn delete_by_key_prefix(&self, prefix: &str) -> Result<u64> {
        let mut collections = self.db.collections.write().await;
        Ok(match collections.get_mut(&self.collection) {
            Some(collection) => collection.remove_where(|doc| doc.key.starts_with(prefix)),
            None => 0,
        })
    }

    async fn drop_database(&self) -> Result<()> {
        self.db.collections.write().await.clear();
        warn!("⚠ Document database {} dropped!", self.db.name);
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let collections = self.db.collections.read().await;
        Ok(collections
            .get(&self.collection)
            .map_or(0, |collection| collection.docs.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> InMemoryDocumentStore {
        InMemoryDocumentStore::new(&DocumentOptions::default())
    }

    #[tokio::test]
    async fn test_insert_duplicate_key_fails_with_unique_index() {
        let store = store();
        store
            .ensure_unique_key_index()
            .await
            .expect("Failed to create index");

        store
            .insert(Document::new("a", b"1".to_vec()))
            .await
            .expect("Failed to insert");
        let err = store
            .insert(Document::new("a", b"2".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateKey(key) if key == "a"));
    }

    #[tokio::test]
    async fn test_upsert_replaces() {
        let store = store();
        store
            .ensure_unique_key_index()
            .await
            .expect("Failed to create index");

        assert!(!store
            .upsert(Document::new("a", b"1".to_vec()))
            .await
            .expect("Failed to upsert"));
        assert!(store
            .upsert(Document::new("a", b"2".to_vec()))
            .await
            .expect("Failed to upsert"));

        assert_eq!(store.count().await.expect("Failed to count"), 1);
        let doc = store
            .find_one("a")
            .await
            .expect("Failed to find")
            .expect("Document should exist");
        assert_eq!(doc.data, b"2".to_vec());
    }

    #[tokio::test]
    async fn test_unique_index_drops_existing_duplicates() {
        let store = store();
        store
            .insert(Document::new("a", b"old".to_vec()))
            .await
            .expect("Failed to insert");
        store
            .insert(Document::new("a", b"new".to_vec()))
            .await
            .expect("Failed to insert");
        assert_eq!(store.count().await.expect("Failed to count"), 2);

        store
            .ensure_unique_key_index()
            .await
            .expect("Failed to create index");
        assert_eq!(store.count().await.expect("Failed to count"), 1);
    }

    #[tokio::test]
    async fn test_find_keys_by_tag() {
        let store = store();
        store
            .upsert(Document::new("a", vec![]).with_tags(vec!["t1".into(), "t2".into()]))
            .await
            .expect("Failed to upsert");
        store
            .upsert(Document::new("b", vec![]).with_tags(vec!["t2".into()]))
            .await
            .expect("Failed to upsert");
        store
            .upsert(Document::new("c", vec![]))
            .await
            .expect("Failed to upsert");

        let mut keys = store.find_keys_by_tag("t2").await.expect("Failed to find");
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
        assert!(store
            .find_keys_by_tag("missing")
            .await
            .expect("Failed to find")
            .is_empty());
    }

    #[tokio::test]
    async fn test_delete_variants() {
        let store = store();
        for key in ["p:a", "p:b", "q:c"] {
            store
                .upsert(Document::new(key, vec![]))
                .await
                .expect("Failed to upsert");
        }

        assert_eq!(store.delete_one("p:a").await.expect("Failed to delete"), 1);
        assert_eq!(store.delete_one("p:a").await.expect("Failed to delete"), 0);
        assert_eq!(
            store
                .delete_by_key_prefix("p:")
                .await
                .expect("Failed to delete"),
            1
        );
        assert_eq!(
            store
                .delete_many(&["q:c".to_string(), "zzz".to_string()])
                .await
                .expect("Failed to delete"),
            1
        );
        assert_eq!(store.count().await.expect("Failed to count"), 0);
    }

    #[tokio::test]
    async fn test_drop_database_clears_every_collection() {
        let store = store();
        let other = store.collection("other");
        store
            .upsert(Document::new("a", vec![]))
            .await
            .expect("Failed to upsert");
        other
            .upsert(Document::new("b", vec![]))
            .await
            .expect("Failed to upsert");

        store.drop_database().await.expect("Failed to drop");

        assert_eq!(store.count().await.expect("Failed to count"), 0);
        assert_eq!(other.count().await.expect("Failed to count"), 0);
    }

    #[tokio::test]
    async fn test_sweeper_removes_expired_documents() {
        let store = store();
        store.ensure_ttl_index().await.expect("Failed to create index");

        let past = Utc::now() - chrono::Duration::seconds(5);
        store
            .upsert(Document::new("old", vec![]).with_expire(past))
            .await
            .expect("Failed to upsert");
        store
            .upsert(Document::new("fresh", vec![]))
            .await
            .expect("Failed to upsert");

        let handle = store.start_sweeper(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(store.find_one("old").await.expect("Failed to find").is_none());
        assert!(store
            .find_one("fresh")
            .await
            .expect("Failed to find")
            .is_some());

        drop(store);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("Sweeper should stop once the store is dropped")
            .expect("Sweeper task failed");
    }

    #[tokio::test]
    async fn test_sweeper_ignores_collections_without_ttl_index() {
        let store = store();
        let past = Utc::now() - chrono::Duration::seconds(5);
        store
            .upsert(Document::new("old", vec![]).with_expire(past))
            .await
            .expect("Failed to upsert");

        let _handle = store.start_sweeper(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(store.count().await.expect("Failed to count"), 1);
    }
}
