//! Error types for the cache facade
//!
//! Provides unified error handling using thiserror. Driver failures are kept
//! as the error source so callers can inspect the original cause.

use thiserror::Error;

/// Boxed driver error carried as the source of a facade error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// == Cache Error Enum ==
/// Unified error type for the cache facade.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Empty or malformed key, or another invalid caller-supplied value
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The selected strategy is missing a required setting
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The driver is not compiled in, or no connection has been established
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Connecting, authenticating or selecting a database failed
    #[error("Unable to connect to {backend}")]
    Connection {
        backend: &'static str,
        #[source]
        source: BoxError,
    },

    /// A non-overwriting store hit an unexpired entry
    #[error("This key already exists")]
    KeyExists,

    /// No entry stored under the key
    #[error("No such element found")]
    NotFound,

    /// The entry exists but its TTL has elapsed
    #[error("Element has expired")]
    Expired,

    /// The stored record lacks its value or expiry fields
    #[error("Malformed element")]
    MalformedEntry,

    /// The value could not be encoded as JSON
    #[error("Unable to serialise the given value as JSON string")]
    Serialization(#[source] serde_json::Error),

    /// The stored data could not be decoded from JSON
    #[error("An error occurred while parsing the serialised data")]
    Deserialization(#[source] serde_json::Error),

    /// Filesystem failure in the file strategy
    #[error("I/O error while {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Any driver-level failure from Redis, Memcached or SQLite
    #[error("An error occurred in {backend} transaction")]
    Backend {
        backend: &'static str,
        #[source]
        source: BoxError,
    },
}

impl CacheError {
    /// Wraps a driver error raised during an operation.
    pub fn backend(backend: &'static str, source: impl Into<BoxError>) -> Self {
        CacheError::Backend {
            backend,
            source: source.into(),
        }
    }

    /// Wraps a driver error raised while establishing a connection.
    pub fn connection(backend: &'static str, source: impl Into<BoxError>) -> Self {
        CacheError::Connection {
            backend,
            source: source.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        CacheError::Io {
            context: context.into(),
            source,
        }
    }

    /// Returns true for the read-path misses that quiet mode turns into `None`.
    pub fn is_miss(&self) -> bool {
        matches!(
            self,
            CacheError::NotFound | CacheError::Expired | CacheError::MalformedEntry
        )
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache facade.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_miss_classification() {
        assert!(CacheError::NotFound.is_miss());
        assert!(CacheError::Expired.is_miss());
        assert!(CacheError::MalformedEntry.is_miss());
        assert!(!CacheError::KeyExists.is_miss());
        assert!(!CacheError::InvalidArgument("key".into()).is_miss());
    }

    #[test]
    fn test_backend_error_keeps_source() {
        let err = CacheError::backend("redis", "connection reset");
        assert_eq!(err.to_string(), "An error occurred in redis transaction");
        assert_eq!(err.source().unwrap().to_string(), "connection reset");
    }
}
