//! Adapter configuration.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::str::FromStr;

/// Default prefix for data keys.
pub const DEFAULT_PREFIX_KEY: &str = "tagcache-key:";

/// Default prefix for tag keys.
pub const DEFAULT_PREFIX_TAG: &str = "tagcache-tag:";

/// Which codec handles object payloads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializerKind {
    /// Raw payloads only; saving an object is an error.
    None,
    /// JSON text (readable by other clients of a shared backend).
    Json,
    /// Postcard binary inside a versioned envelope.
    #[default]
    Postcard,
}

impl FromStr for SerializerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(SerializerKind::None),
            "json" => Ok(SerializerKind::Json),
            "postcard" | "binary" => Ok(SerializerKind::Postcard),
            other => Err(Error::ConfigError(format!("unknown serializer: {}", other))),
        }
    }
}

/// Options shared by every adapter.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    pub prefix_key: String,
    pub prefix_tag: String,
    /// When false, tags passed to `save` are ignored and tag operations
    /// succeed without touching storage.
    pub tag_enable: bool,
    /// Hash logical keys and tags (SHA-256) before prefixing.
    pub hash_keys: bool,
    pub serializer: SerializerKind,
}

impl Default for CacheOptions {
    fn default() -> Self {
        CacheOptions {
            prefix_key: DEFAULT_PREFIX_KEY.to_string(),
            prefix_tag: DEFAULT_PREFIX_TAG.to_string(),
            tag_enable: true,
            hash_keys: false,
            serializer: SerializerKind::default(),
        }
    }
}

impl CacheOptions {
    pub fn with_prefix_key(mut self, prefix: impl Into<String>) -> Self {
        self.prefix_key = prefix.into();
        self
    }

    pub fn with_prefix_tag(mut self, prefix: impl Into<String>) -> Self {
        self.prefix_tag = prefix.into();
        self
    }

    pub fn with_tags(mut self, enabled: bool) -> Self {
        self.tag_enable = enabled;
        self
    }

    pub fn with_hashed_keys(mut self, enabled: bool) -> Self {
        self.hash_keys = enabled;
        self
    }

    pub fn with_serializer(mut self, kind: SerializerKind) -> Self {
        self.serializer = kind;
        self
    }

    /// Build options from environment variables, falling back to defaults.
    ///
    /// Recognized variables:
    /// - `TAGCACHE_PREFIX_KEY`
    /// - `TAGCACHE_PREFIX_TAG`
    /// - `TAGCACHE_TAG_ENABLE` (`true`/`false`/`1`/`0`)
    /// - `TAGCACHE_HASH_KEYS`
    /// - `TAGCACHE_SERIALIZER` (`none`, `json`, `postcard`)
    ///
    /// # Errors
    /// Returns `Error::ConfigError` for unparsable values.
    pub fn from_env() -> Result<Self> {
        let mut options = CacheOptions::default();

        if let Ok(prefix) = std::env::var("TAGCACHE_PREFIX_KEY") {
            options.prefix_key = prefix;
        }
        if let Ok(prefix) = std::env::var("TAGCACHE_PREFIX_TAG") {
            options.prefix_tag = prefix;
        }
        if let Ok(value) = std::env::var("TAGCACHE_TAG_ENABLE") {
            options.tag_enable = parse_flag("TAGCACHE_TAG_ENABLE", &value)?;
        }
        if let Ok(value) = std::env::var("TAGCACHE_HASH_KEYS") {
            options.hash_keys = parse_flag("TAGCACHE_HASH_KEYS", &value)?;
        }
        if let Ok(value) = std::env::var("TAGCACHE_SERIALIZER") {
            options.serializer = value.parse()?;
        }

        debug!("Cache options loaded from environment: {:?}", options);
        Ok(options)
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::ConfigError(format!(
            "{} must be a boolean, got {:?}",
            name, other
        ))),
    }
}

/// Location of the cache collection inside a document store.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DocumentOptions {
    pub db_name: String,
    pub collection_name: String,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        DocumentOptions {
            db_name: "tagcache".to_string(),
            collection_name: "cache".to_string(),
        }
    }
}
