//! Key Module
//!
//! Derives the storage identifiers used by every backend from the configured
//! namespace and the caller's raw key.

use sha2::{Digest, Sha256};


// == Public Constants ==
/// Prefix shared by every composite key written by the facade
pub const KEY_PREFIX: &str = "cache";

/// Namespace hash used when no namespace is configured
pub const NO_NAMESPACE: &str = "*";

// == Key ==
/// Storage identifiers for one cache entry, recomputed on every operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    /// Hash of the namespace, or `*` when no namespace is set
    pub namespace: String,
    /// Hash of the raw entry key, if one was given
    pub entry: Option<String>,
    /// `cache:<namespace>:<entry>` for flat key/value backends
    pub composite: Option<String>,
}

impl Key {
    /// Returns the entry hash, failing for namespace-only keys.
    pub fn entry(&self) -> crate::Result<&str> {
        self.entry
            .as_deref()
            .ok_or_else(|| crate::CacheError::InvalidArgument("key has no entry component".into()))
    }

    /// Returns the composite key, failing for namespace-only keys.
    pub fn composite(&self) -> crate::Result<&str> {
        self.composite
            .as_deref()
            .ok_or_else(|| crate::CacheError::InvalidArgument("key has no entry component".into()))
    }

    /// Glob matching every composite key of this key's namespace.
    pub fn namespace_pattern(&self) -> String {
        // `*` is a glob wildcard, escape it so the no-namespace scope stays exact
        let namespace = if self.namespace == NO_NAMESPACE {
            "\\*"
        } else {
            self.namespace.as_str()
        };
        format!("{}:{}:*", KEY_PREFIX, namespace)
    }

    /// Prefix shared by every composite key of this key's namespace.
    pub fn namespace_prefix(&self) -> String {
        format!("{}:{}:", KEY_PREFIX, self.namespace)
    }
}

/// Glob matching every composite key the facade writes.
pub fn all_pattern() -> String {
    format!("{}:*", KEY_PREFIX)
}

/// Prefix shared by every composite key the facade writes.
pub fn all_prefix() -> String {
    format!("{}:", KEY_PREFIX)
}

// == Key Builder ==
/// Builds keys for the active namespace, caching the namespace hash.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    namespace: String,
    namespace_hash: String,
}

impl KeyBuilder {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            namespace_hash: hash_namespace(namespace),
        }
    }

    /// Replaces the namespace; the cached hash is recomputed only on change.
    pub fn set_namespace(&mut self, namespace: &str) {
        if self.namespace != namespace {
            self.namespace_hash = hash_namespace(namespace);
            self.namespace = namespace.to_string();
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn namespace_hash(&self) -> &str {
        &self.namespace_hash
    }

    // == Build ==
    /// Derives the key for `raw`; `None` or an empty string yields a
    /// namespace-only key.
    pub fn build(&self, raw: Option<&str>) -> Key {
        let entry = raw.filter(|raw| !raw.is_empty()).map(digest);
        let composite = entry
            .as_ref()
            .map(|entry| format!("{}:{}:{}", KEY_PREFIX, self.namespace_hash, entry));

        Key {
            namespace: self.namespace_hash.clone(),
            entry,
            composite,
        }
    }
}

impl Default for KeyBuilder {
    fn default() -> Self {
        Self::new("")
    }
}

fn hash_namespace(namespace: &str) -> String {
    if namespace.is_empty() {
        NO_NAMESPACE.to_string()
    } else {
        digest(namespace)
    }
}

/// Hex-encoded SHA-256 of `input`.
fn digest(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}
