//! Cache facade: object serialization, TTL policy and metrics on top of an
//! adapter.

use crate::adapter::CacheAdapter;
use crate::error::Result;
use crate::observability::{CacheMetrics, NoOpMetrics, TtlPolicy};
use crate::options::CacheOptions;
use crate::serialization::{AnySerializer, Serializer};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of [`Cache::load_value`].
#[derive(Clone, Debug, PartialEq)]
pub enum Loaded<T> {
    /// The payload was produced by the serializer and decoded.
    Value(T),
    /// The payload was stored raw; returned byte for byte.
    Raw(Vec<u8>),
}

impl<T> Loaded<T> {
    pub fn into_value(self) -> Option<T> {
        match self {
            Loaded::Value(value) => Some(value),
            Loaded::Raw(_) => None,
        }
    }
}

/// Shareable cache handle.
///
/// Clones share the adapter and metrics sink.
///
/// # Example
///
/// ```
/// use tagcache::{Cache, Loaded};
/// use tagcache::adapter::FlatAdapter;
/// use tagcache::options::CacheOptions;
/// use tagcache::store::InMemoryStore;
///
/// # #[tokio::main]
/// # async fn main() -> tagcache::Result<()> {
/// let options = CacheOptions::default();
/// let cache = Cache::from_options(FlatAdapter::new(InMemoryStore::new(), &options)?, &options);
///
/// cache.save_value(&vec![1u32, 2, 3], "numbers", &["lists"], None).await?;
/// let loaded: Option<Loaded<Vec<u32>>> = cache.load_value("numbers").await?;
/// assert_eq!(loaded, Some(Loaded::Value(vec![1, 2, 3])));
/// # Ok(())
/// # }
/// ```
pub struct Cache<A: CacheAdapter, S: Serializer = AnySerializer> {
    adapter: Arc<A>,
    serializer: S,
    metrics: Arc<dyn CacheMetrics>,
    ttl_policy: TtlPolicy,
}

impl<A: CacheAdapter> Cache<A, AnySerializer> {
    /// Wrap `adapter`, picking the serializer named in `options`.
    pub fn from_options(adapter: A, options: &CacheOptions) -> Self {
        Cache::new(adapter, AnySerializer::from(options.serializer))
    }
}

impl<A: CacheAdapter, S: Serializer> Clone for Cache<A, S> {
    fn clone(&self) -> Self {
        Cache {
            adapter: Arc::clone(&self.adapter),
            serializer: self.serializer.clone(),
            metrics: Arc::clone(&self.metrics),
            ttl_policy: self.ttl_policy.clone(),
        }
    }
}

impl<A: CacheAdapter, S: Serializer> Cache<A, S> {
    pub fn new(adapter: A, serializer: S) -> Self {
        Cache {
            adapter: Arc::new(adapter),
            serializer,
            metrics: Arc::new(NoOpMetrics),
            ttl_policy: TtlPolicy::default(),
        }
    }

    /// Set custom metrics handler.
    pub fn with_metrics(mut self, metrics: Arc<dyn CacheMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Set the TTL applied when `save_*` is called without one.
    pub fn with_ttl_policy(mut self, policy: TtlPolicy) -> Self {
        self.ttl_policy = policy;
        self
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn serializer(&self) -> &S {
        &self.serializer
    }

    /// Store bytes verbatim.
    ///
    /// # Errors
    /// Returns `Err` if the backend is unreachable.
    pub async fn save_raw(
        &self,
        data: Vec<u8>,
        key: &str,
        tags: &[&str],
        ttl: Option<Duration>,
    ) -> Result<bool> {
        let ttl = self.ttl_policy.resolve(key, ttl);
        let start = Instant::now();
        let result = self.adapter.save(data, key, tags, ttl).await;
        self.report_write(key, &result, start, "partial save");
        if matches!(result, Ok(true)) {
            self.metrics.record_set(key, start.elapsed());
        }
        result
    }

    /// Serialize `value` and store it.
    ///
    /// # Errors
    /// Returns `Error::SerializationError` if the value cannot be encoded
    /// (or object payloads are disabled), or `Err` if the backend is
    /// unreachable.
    pub async fn save_value<T: Serialize>(
        &self,
        value: &T,
        key: &str,
        tags: &[&str],
        ttl: Option<Duration>,
    ) -> Result<bool> {
        let data = self.serializer.serialize(value).map_err(|e| {
            error!("✗ Failed to serialize value for {}: {}", key, e);
            self.metrics.record_error(key, &e.to_string());
            e
        })?;
        self.save_raw(data, key, tags, ttl).await
    }

    /// Load the stored bytes verbatim.
    ///
    /// # Errors
    /// Returns `Err` if the backend is unreachable.
    pub async fn load_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let start = Instant::now();
        match self.adapter.load(key).await {
            Ok(Some(data)) => {
                self.metrics.record_hit(key, start.elapsed());
                Ok(Some(data))
            }
            Ok(None) => {
                self.metrics.record_miss(key, start.elapsed());
                Ok(None)
            }
            Err(e) => {
                self.metrics.record_error(key, &e.to_string());
                Err(e)
            }
        }
    }

    /// Load and, if the payload was produced by the serializer, decode it.
    ///
    /// # Errors
    /// Returns a deserialization error if a recognized payload fails to
    /// decode as `T`, or `Err` if the backend is unreachable.
    pub async fn load_value<T: DeserializeOwned>(&self, key: &str) -> Result<Option<Loaded<T>>> {
        let data = match self.load_raw(key).await? {
            Some(data) => data,
            None => return Ok(None),
        };

        if !self.serializer.is_serialized(&data) {
            return Ok(Some(Loaded::Raw(data)));
        }
        match self.serializer.unserialize(&data) {
            Ok(value) => Ok(Some(Loaded::Value(value))),
            Err(e) => {
                error!("✗ Failed to deserialize value for {}: {}", key, e);
                self.metrics.record_error(key, &e.to_string());
                Err(e)
            }
        }
    }

    /// Backend keys registered under `tag`.
    ///
    /// # Errors
    /// Returns `Err` if the backend is unreachable.
    pub async fn load_tag(&self, tag: &str) -> Result<Vec<String>> {
        self.adapter.load_tag(tag).await.map_err(|e| {
            self.metrics.record_error(tag, &e.to_string());
            e
        })
    }

    /// # Errors
    /// Returns `Err` if the backend is unreachable.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let start = Instant::now();
        let result = self.adapter.delete(key).await;
        self.report_write(key, &result, start, "partial delete");
        if matches!(result, Ok(true)) {
            self.metrics.record_delete(key, start.elapsed());
        }
        result
    }

    /// # Errors
    /// Returns `Err` if the backend is unreachable.
    pub async fn clean(&self, tags: &[&str]) -> Result<bool> {
        let start = Instant::now();
        let result = self.adapter.clean(tags).await;
        self.report_write(&tags.join(","), &result, start, "partial clean");
        if matches!(result, Ok(true)) {
            self.metrics.record_clean(tags, start.elapsed());
        }
        result
    }

    /// # Errors
    /// Returns `Err` if the backend is unreachable.
    pub async fn flush(&self, all: bool) -> Result<bool> {
        if all {
            warn!("⚠ Flushing the whole cache backend");
        }
        let start = Instant::now();
        let result = self.adapter.flush(all).await;
        self.report_write("*", &result, start, "partial flush");
        if matches!(result, Ok(true)) {
            self.metrics.record_clean(&[], start.elapsed());
        }
        result
    }

    fn report_write(&self, key: &str, result: &Result<bool>, start: Instant, what: &str) {
        match result {
            Ok(true) => {}
            Ok(false) => self.metrics.record_error(key, what),
            Err(e) => {
                debug!("✗ {} failed after {:?}", key, start.elapsed());
                self.metrics.record_error(key, &e.to_string());
            }
        }
    }
}
