//! Object serialization for cache payloads.
//!
//! Adapters store bytes. Raw payloads are stored verbatim; objects go
//! through a [`Serializer`] first. On the way back, a payload that the
//! serializer recognizes (`is_serialized`) is decoded, anything else is
//! handed back untouched.
//!
//! The default codec is Postcard wrapped in a versioned envelope:
//!
//! ```text
//! ┌─────────────────┬─────────────────┬──────────────────────────┐
//! │  MAGIC (4 bytes)│VERSION (varint) │POSTCARD PAYLOAD (N bytes)│
//! └─────────────────┴─────────────────┴──────────────────────────┘
//!   "TAGC"              u32                postcard::to_allocvec(T)
//! ```
//!
//! # Example
//!
//! ```rust
//! use tagcache::serialization::{PostcardSerializer, Serializer};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! # fn main() -> tagcache::Result<()> {
//! let user = User { id: 1, name: "Alice".to_string() };
//! let serializer = PostcardSerializer;
//!
//! let bytes = serializer.serialize(&user)?;
//! assert!(serializer.is_serialized(&bytes));
//! assert!(!serializer.is_serialized(b"plain text"));
//!
//! let back: User = serializer.unserialize(&bytes)?;
//! assert_eq!(user, back);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use crate::options::SerializerKind;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};

/// Magic header for envelope-encoded entries: b"TAGC"
pub const CACHE_MAGIC: [u8; 4] = *b"TAGC";

/// Current schema version.
///
/// Increment when cached types change incompatibly. Entries written with
/// another version are rejected with `Error::VersionMismatch`.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// The serializer capability adapters are handed.
pub trait Serializer: Send + Sync + Clone {
    /// Encode a value into cache bytes.
    ///
    /// # Errors
    /// Returns `Error::SerializationError` if the codec fails.
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    /// Decode cache bytes.
    ///
    /// # Errors
    /// Returns `Error::DeserializationError` (or an envelope error) if the
    /// bytes do not decode into `T`.
    fn unserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;

    /// Whether the bytes look like something this serializer produced.
    fn is_serialized(&self, bytes: &[u8]) -> bool;
}

/// Versioned envelope around every Postcard payload.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CacheEnvelope<T> {
    /// Magic header: must be b"TAGC"
    pub magic: [u8; 4],
    /// Schema version: must match CURRENT_SCHEMA_VERSION
    pub version: u32,
    /// The actual cached data
    pub payload: T,
}

impl<T> CacheEnvelope<T> {
    /// Create a new envelope with current magic and version.
    pub fn new(payload: T) -> Self {
        Self {
            magic: CACHE_MAGIC,
            version: CURRENT_SCHEMA_VERSION,
            payload,
        }
    }
}

/// Serialize a value with envelope for cache storage.
///
/// # Errors
///
/// Returns `Error::SerializationError` if Postcard serialization fails.
pub fn serialize_for_cache<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let envelope = CacheEnvelope::new(value);
    postcard::to_allocvec(&envelope).map_err(|e| {
        error!("Cache serialization failed: {}", e);
        Error::SerializationError(e.to_string())
    })
}

/// Deserialize a value from cache storage with validation.
///
/// Checks the magic header, then the schema version, then decodes the
/// payload.
///
/// # Errors
///
/// - `Error::DeserializationError`: Corrupted Postcard payload
/// - `Error::InvalidCacheEntry`: Invalid magic header
/// - `Error::VersionMismatch`: Schema version mismatch
pub fn deserialize_from_cache<'de, T: Deserialize<'de>>(bytes: &'de [u8]) -> Result<T> {
    let envelope: CacheEnvelope<T> = postcard::from_bytes(bytes).map_err(|e| {
        error!("Cache deserialization failed: {}", e);
        Error::DeserializationError(e.to_string())
    })?;

    if envelope.magic != CACHE_MAGIC {
        warn!(
            "Invalid cache entry: expected magic {:?}, got {:?}",
            CACHE_MAGIC, envelope.magic
        );
        return Err(Error::InvalidCacheEntry(format!(
            "Invalid magic: expected {:?}, got {:?}",
            CACHE_MAGIC, envelope.magic
        )));
    }

    if envelope.version != CURRENT_SCHEMA_VERSION {
        warn!(
            "Cache version mismatch: expected {}, got {}",
            CURRENT_SCHEMA_VERSION, envelope.version
        );
        return Err(Error::VersionMismatch {
            expected: CURRENT_SCHEMA_VERSION,
            found: envelope.version,
        });
    }

    Ok(envelope.payload)
}

/// Postcard codec with the versioned envelope. The binary choice.
#[derive(Clone, Copy, Debug, Default)]
pub struct PostcardSerializer;

impl Serializer for PostcardSerializer {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        serialize_for_cache(value)
    }

    fn unserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        deserialize_from_cache(bytes)
    }

    fn is_serialized(&self, bytes: &[u8]) -> bool {
        // Postcard writes fixed-size byte arrays verbatim, so the magic is
        // always the first four bytes, followed by at least the version.
        bytes.len() > CACHE_MAGIC.len() && bytes.starts_with(&CACHE_MAGIC)
    }
}

/// JSON codec.
///
/// Any valid JSON document counts as serialized, so raw payloads that
/// happen to be JSON (e.g. `b"42"`) are decoded on load.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| {
            error!("JSON serialization failed: {}", e);
            Error::SerializationError(e.to_string())
        })
    }

    fn unserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| Error::DeserializationError(e.to_string()))
    }

    fn is_serialized(&self, bytes: &[u8]) -> bool {
        serde_json::from_slice::<IgnoredAny>(bytes).is_ok()
    }
}

/// Serializer picked at runtime from [`SerializerKind`].
#[derive(Clone, Copy, Debug)]
pub enum AnySerializer {
    /// Object payloads are refused; every stored value is raw.
    Disabled,
    Json(JsonSerializer),
    Postcard(PostcardSerializer),
}

impl Default for AnySerializer {
    fn default() -> Self {
        AnySerializer::Postcard(PostcardSerializer)
    }
}

impl From<SerializerKind> for AnySerializer {
    fn from(kind: SerializerKind) -> Self {
        match kind {
            SerializerKind::None => AnySerializer::Disabled,
            SerializerKind::Json => AnySerializer::Json(JsonSerializer),
            SerializerKind::Postcard => AnySerializer::Postcard(PostcardSerializer),
        }
    }
}

impl Serializer for AnySerializer {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            AnySerializer::Disabled => Err(Error::SerializationError(
                "object serializer is disabled".to_string(),
            )),
            AnySerializer::Json(s) => s.serialize(value),
            AnySerializer::Postcard(s) => s.serialize(value),
        }
    }

    fn unserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        match self {
            AnySerializer::Disabled => Err(Error::DeserializationError(
                "object serializer is disabled".to_string(),
            )),
            AnySerializer::Json(s) => s.unserialize(bytes),
            AnySerializer::Postcard(s) => s.unserialize(bytes),
        }
    }

    fn is_serialized(&self, bytes: &[u8]) -> bool {
        match self {
            AnySerializer::Disabled => false,
            AnySerializer::Json(s) => s.is_serialized(bytes),
            AnySerializer::Postcard(s) => s.is_serialized(bytes),
        }
    }
}
