//! Backend Module
//!
//! The capability surface every storage strategy implements, plus the
//! implementations themselves.

mod entry;
mod file;
mod map;
mod session;


#[cfg(feature = "memcached")]
mod memcached;
#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use entry::{current_timestamp, expiry_timestamp, CacheEntry, EntryMap};
pub use file::FileBackend;
pub use map::{EntryRoot, LocalRoot, MapBackend, SessionRoot, SharedStore};
pub use session::{MemorySession, SessionContext, SESSION_ROOT_KEY};

#[cfg(feature = "memcached")]
pub use memcached::MemcachedBackend;
#[cfg(feature = "redis")]
pub use self::redis::RedisBackend;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;

use serde_json::Value;

use crate::error::Result;
use crate::key::Key;

// == Cache Backend ==
/// Operations a storage strategy performs on already-derived keys.
///
/// Keys handed to entry operations always carry an entry hash. Misses are
/// reported as `NotFound`, `Expired` or `MalformedEntry`; the facade decides
/// whether to surface them.
pub trait CacheBackend {
    /// Short backend name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Writes `value`, expiring `ttl` seconds from now (0 = never).
    ///
    /// Fails with `KeyExists` when `overwrite` is false and an unexpired entry
    /// is already stored.
    fn store(&mut self, key: &Key, value: &Value, overwrite: bool, ttl: u64) -> Result<()>;

    fn fetch(&mut self, key: &Key) -> Result<Value>;

    fn exists(&mut self, key: &Key) -> Result<bool>;

    /// Adds `delta` to a numeric entry. Non-numeric entries are left alone.
    fn increment(&mut self, key: &Key, delta: f64) -> Result<()>;

    /// Deletes the entry; a missing entry is not an error.
    fn remove(&mut self, key: &Key) -> Result<()>;

    /// Drops every entry (`all`) or only those in `key`'s namespace.
    fn invalidate(&mut self, key: &Key, all: bool) -> Result<()>;

    /// Purges expired entries, returning how many were removed.
    fn garbage_collect(&mut self) -> Result<usize> {
        Ok(0)
    }

    fn supports_increment(&self) -> bool {
        true
    }

    /// False for backends that only increment by whole numbers.
    fn supports_float_increment(&self) -> bool {
        true
    }
}
