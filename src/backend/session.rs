//! Session Context Module
//!
//! Abstraction over a host-provided, request-scoped key/value session.

use std::collections::HashMap;

use serde_json::Value;

/// Root key under which the facade keeps its session data
pub const SESSION_ROOT_KEY: &str = "cache";

// == Session Context ==
/// Session storage supplied by the host environment.
pub trait SessionContext: Send {
    /// Returns false when no session is active (e.g. outside a request).
    fn is_available(&self) -> bool;

    fn get(&self, key: &str) -> Option<Value>;

    fn set(&mut self, key: &str, value: Value);

    fn remove(&mut self, key: &str);
}

// == Memory Session ==
/// In-memory session context for hosts without their own session layer.
#[derive(Debug, Clone, Default)]
pub struct MemorySession {
    values: HashMap<String, Value>,
    disabled: bool,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context that reports no active session.
    pub fn disabled() -> Self {
        Self {
            values: HashMap::new(),
            disabled: true,
        }
    }
}

impl SessionContext for MemorySession {
    fn is_available(&self) -> bool {
        !self.disabled
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }
}
