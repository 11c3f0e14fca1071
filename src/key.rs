//! Cache key management utilities.
//!
//! Every logical key and tag is namespaced before it reaches a backend:
//!
//! ```text
//! logical key "user:1"  ->  "tagcache-key:user:1"
//! logical tag "users"   ->  "tagcache-tag:users"
//! ```
//!
//! Flat backends store tag indexes next to data entries, so the two
//! prefixes must never overlap.

use crate::error::{Error, Result};
use crate::options::CacheOptions;
use sha2::{Digest, Sha256};

/// Deterministic mapping of logical keys and tags to backend keys.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyMapper {
    prefix_key: String,
    prefix_tag: String,
    hash: bool,
}

impl KeyMapper {
    /// Build a mapper from two prefixes.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if a prefix is empty, or if one prefix
    /// is a prefix of the other (which includes equal prefixes).
    pub fn new(prefix_key: impl Into<String>, prefix_tag: impl Into<String>) -> Result<Self> {
        let prefix_key = prefix_key.into();
        let prefix_tag = prefix_tag.into();

        if prefix_key.is_empty() || prefix_tag.is_empty() {
            return Err(Error::ConfigError(
                "key and tag prefixes must not be empty".to_string(),
            ));
        }

        if prefix_key.starts_with(&prefix_tag) || prefix_tag.starts_with(&prefix_key) {
            return Err(Error::ConfigError(format!(
                "key prefix {:?} and tag prefix {:?} overlap",
                prefix_key, prefix_tag
            )));
        }

        Ok(KeyMapper {
            prefix_key,
            prefix_tag,
            hash: false,
        })
    }

    /// Build a mapper from cache options.
    ///
    /// # Errors
    /// Same as [`KeyMapper::new`].
    pub fn from_options(options: &CacheOptions) -> Result<Self> {
        Ok(Self::new(&options.prefix_key, &options.prefix_tag)?.with_hashing(options.hash_keys))
    }

    /// Replace logical identifiers with their SHA-256 hex digest.
    pub fn with_hashing(mut self, enabled: bool) -> Self {
        self.hash = enabled;
        self
    }

    /// Map a logical key to its backend key.
    pub fn map_key(&self, key: &str) -> String {
        self.map(&self.prefix_key, key)
    }

    /// Map a logical tag to its backend key.
    pub fn map_tag(&self, tag: &str) -> String {
        self.map(&self.prefix_tag, tag)
    }

    /// Whether a backend key lives in the data namespace.
    pub fn owns_key(&self, backend_key: &str) -> bool {
        backend_key.starts_with(&self.prefix_key)
    }

    /// Whether a backend key lives in the tag namespace.
    pub fn owns_tag(&self, backend_key: &str) -> bool {
        backend_key.starts_with(&self.prefix_tag)
    }

    pub fn key_prefix(&self) -> &str {
        &self.prefix_key
    }

    pub fn tag_prefix(&self) -> &str {
        &self.prefix_tag
    }

    fn map(&self, prefix: &str, id: &str) -> String {
        if self.hash {
            format!("{}{:x}", prefix, Sha256::digest(id.as_bytes()))
        } else {
            format!("{}{}", prefix, id)
        }
    }
}

impl Default for KeyMapper {
    fn default() -> Self {
        let options = CacheOptions::default();
        KeyMapper {
            prefix_key: options.prefix_key,
            prefix_tag: options.prefix_tag,
            hash: options.hash_keys,
        }
    }
}
