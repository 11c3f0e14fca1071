//! Error types for the cache adapters.

use std::fmt;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cache adapters.
///
/// A cache miss is never an error: lookups return `Ok(None)` (or an empty
/// sequence for tag lookups). Partial write failures are reported as
/// `Ok(false)` by the mutating operations. The variants below cover the
/// remaining failure modes:
#[derive(Debug, Clone)]
pub enum Error {
    /// Serialization failed when converting a value to cache bytes.
    ///
    /// Common causes:
    /// - Value contains non-serializable types
    /// - Postcard or JSON codec error
    /// - Object payload saved while the serializer is disabled
    SerializationError(String),

    /// Deserialization failed when converting cache bytes to a value.
    ///
    /// This indicates corrupted or malformed data in cache, or a tag index
    /// that was overwritten by a foreign client of a shared backend.
    ///
    /// **Recovery:** Cache entry should be evicted and recomputed.
    DeserializationError(String),

    /// Backend storage error (in-process segment, Redis, document store).
    ///
    /// This indicates the cache backend is unavailable or returned an error.
    /// Common causes:
    /// - Redis connection lost
    /// - Network timeout
    /// - Backend protocol error
    ///
    /// Adapters never retry: the error is handed back to the caller.
    BackendError(String),

    /// Configuration error during adapter construction.
    ///
    /// Common causes:
    /// - Empty key or tag prefix
    /// - Key and tag prefixes that are not disjoint
    /// - Unknown serializer name
    /// - Invalid connection string
    ConfigError(String),

    /// A plain insert hit the unique index on the document key.
    ///
    /// `save` upserts and never produces this; it is raised by direct
    /// inserts into a [`DocumentStore`](crate::store::DocumentStore).
    DuplicateKey(String),

    /// Invalid cache entry: corrupted envelope or bad magic.
    ///
    /// Returned when:
    /// - Magic header is not `b"TAGC"`
    /// - Envelope deserialization fails
    ///
    /// **Recovery:** Evict the cache entry and recompute.
    InvalidCacheEntry(String),

    /// Schema version mismatch between code and cached data.
    ///
    /// **Recovery:** Cache entry is evicted and recomputed on next access.
    VersionMismatch {
        /// Expected schema version (from compiled code)
        expected: u32,
        /// Found schema version (from cached entry)
        found: u32,
    },

    /// Generic error with custom message.
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::DuplicateKey(key) => write!(f, "Duplicate key: {}", key),
            Error::InvalidCacheEntry(msg) => {
                write!(f, "Invalid cache entry: {}", msg)
            }
            Error::VersionMismatch { expected, found } => {
                write!(
                    f,
                    "Cache version mismatch: expected {}, found {}",
                    expected, found
                )
            }
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Error::BackendError(e.to_string())
        } else if e.is_syntax() || e.is_data() || e.is_eof() {
            Error::DeserializationError(e.to_string())
        } else {
            Error::SerializationError(e.to_string())
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::BackendError(e.to_string())
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::BackendError(format!("Redis error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ConfigError("Test".to_string());
        assert_eq!(err.to_string(), "Config error: Test");

        let err = Error::DuplicateKey("tagcache-key:a".to_string());
        assert_eq!(err.to_string(), "Duplicate key: tagcache-key:a");
    }

    #[test]
    fn test_error_from_string() {
        let err: Error = "test error".into();
        assert!(matches!(err, Error::Other(_)));
    }

    #[test]
    fn test_error_from_json_syntax() {
        let err: Error = serde_json::from_slice::<Vec<String>>(b"not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, Error::DeserializationError(_)));
    }
}
