//! Cache Entry Module
//!
//! Defines the record kept by the map-based backends (local, shared and
//! session), with TTL support.

use serde_json::{json, Map, Value};

// == Cache Entry ==
/// A stored value and its absolute expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// The stored value
    pub value: Value,
    /// Expiration timestamp (Unix seconds), 0 = no expiration
    pub expire: i64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry expiring `ttl_seconds` from now (0 = never).
    pub fn new(value: Value, ttl_seconds: u64) -> Self {
        Self {
            value,
            expire: expiry_timestamp(ttl_seconds),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// # Returns
    /// - `true` if the entry has an expiry and the current second is past it
    /// - `false` if the entry never expires or is still within its expiry
    ///   second
    pub fn is_expired(&self) -> bool {
        self.expire > 0 && self.expire < current_timestamp()
    }

    // == Record Conversion ==
    /// Reads an entry from its stored record, `None` if either field is
    /// missing or the expiry is not an integer.
    pub fn from_record(record: &Value) -> Option<Self> {
        let record = record.as_object()?;
        let value = record.get("value")?.clone();
        let expire = record.get("expire")?.as_i64()?;
        Some(Self { value, expire })
    }

    pub fn to_record(&self) -> Value {
        json!({ "value": self.value, "expire": self.expire })
    }

    // == Increment ==
    /// Adds `delta` to a numeric value, returning false when the stored value
    /// is not a number.
    ///
    /// Integer values stay integers while `delta` has no fractional part.
    pub fn increment(&mut self, delta: f64) -> bool {
        let Value::Number(current) = &self.value else {
            return false;
        };

        let updated = match current.as_i64() {
            Some(current) if delta.fract() == 0.0 && delta.abs() < i64::MAX as f64 => {
                current.checked_add(delta as i64).map(Value::from)
            }
            _ => None,
        };
        let updated = updated.or_else(|| {
            current
                .as_f64()
                .and_then(|current| serde_json::Number::from_f64(current + delta))
                .map(Value::Number)
        });

        match updated {
            Some(value) => {
                self.value = value;
                true
            }
            None => false,
        }
    }
}

/// Namespace sub-map holding entry records keyed by entry hash.
pub type EntryMap = Map<String, Value>;

// == Utility Functions ==
/// Returns current Unix timestamp in seconds.
pub fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Absolute expiry for a TTL in seconds, 0 when the TTL is 0.
pub fn expiry_timestamp(ttl_seconds: u64) -> i64 {
    if ttl_seconds == 0 {
        0
    } else {
        current_timestamp().saturating_add(i64::try_from(ttl_seconds).unwrap_or(i64::MAX))
    }
}
