//! Map Backend Module
//!
//! Local, shared and session strategies all keep a two-level map
//! (namespace hash, then entry hash) of entry records. They differ only in
//! where that map lives, which `EntryRoot` abstracts.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Map, Value};
use tracing::debug;

use super::entry::{CacheEntry, EntryMap};
use super::session::{SessionContext, SESSION_ROOT_KEY};
use super::CacheBackend;
use crate::error::{CacheError, Result};
use crate::key::Key;

// == Entry Root ==
/// Owner of the namespace map a `MapBackend` operates on.
pub trait EntryRoot {
    /// Runs `f` with exclusive access to the root map.
    fn with_root<R>(&mut self, f: impl FnOnce(&mut EntryMap) -> R) -> R;
}

// == Local Root ==
/// Map owned by a single facade instance.
#[derive(Debug, Default)]
pub struct LocalRoot {
    root: EntryMap,
}

impl EntryRoot for LocalRoot {
    fn with_root<R>(&mut self, f: impl FnOnce(&mut EntryMap) -> R) -> R {
        f(&mut self.root)
    }
}

// == Shared Store ==
/// Handle to a map shared by every facade it is cloned into.
///
/// The mutex only makes the handle sendable across threads; callers running
/// several facades concurrently still race on individual operations.
#[derive(Debug, Clone, Default)]
pub struct SharedStore {
    inner: Arc<Mutex<EntryMap>>,
}

impl SharedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of namespaces currently holding entries.
    pub fn namespace_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl EntryRoot for SharedStore {
    fn with_root<R>(&mut self, f: impl FnOnce(&mut EntryMap) -> R) -> R {
        let mut root = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut root)
    }
}

// == Session Root ==
/// Map stored under the fixed `"cache"` key of a session context.
pub struct SessionRoot {
    context: Box<dyn SessionContext>,
}

impl SessionRoot {
    pub fn new(context: Box<dyn SessionContext>) -> Self {
        Self { context }
    }

    pub fn is_available(&self) -> bool {
        self.context.is_available()
    }
}

impl EntryRoot for SessionRoot {
    fn with_root<R>(&mut self, f: impl FnOnce(&mut EntryMap) -> R) -> R {
        let mut root = match self.context.get(SESSION_ROOT_KEY) {
            Some(Value::Object(root)) => root,
            _ => Map::new(),
        };
        let result = f(&mut root);
        self.context.set(SESSION_ROOT_KEY, Value::Object(root));
        result
    }
}

// == Map Backend ==
/// `CacheBackend` over any `EntryRoot`, expiring entries lazily on access.
pub struct MapBackend<R> {
    root: R,
    name: &'static str,
}

impl<R: EntryRoot> MapBackend<R> {
    pub fn new(name: &'static str, root: R) -> Self {
        Self { root, name }
    }

    pub fn root(&self) -> &R {
        &self.root
    }
}

/// Looks up the namespace sub-map, if present and well formed.
fn namespace_mut<'a>(root: &'a mut EntryMap, namespace: &str) -> Option<&'a mut EntryMap> {
    root.get_mut(namespace).and_then(Value::as_object_mut)
}

/// Outcome of reading one record with lazy expiry applied.
enum Lookup {
    Missing,
    Malformed,
    Expired,
    Found(CacheEntry),
}

fn lookup(root: &mut EntryMap, namespace: &str, entry: &str) -> Lookup {
    let Some(slots) = namespace_mut(root, namespace) else {
        return Lookup::Missing;
    };
    let Some(record) = slots.get(entry) else {
        return Lookup::Missing;
    };
    match CacheEntry::from_record(record) {
        None => Lookup::Malformed,
        Some(stored) if stored.is_expired() => {
            slots.remove(entry);
            Lookup::Expired
        }
        Some(stored) => Lookup::Found(stored),
    }
}

impl<R: EntryRoot> CacheBackend for MapBackend<R> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn store(&mut self, key: &Key, value: &Value, overwrite: bool, ttl: u64) -> Result<()> {
        let entry = key.entry()?;
        self.root.with_root(|root| {
            if !matches!(root.get(&key.namespace), Some(Value::Object(_))) {
                root.insert(key.namespace.clone(), Value::Object(Map::new()));
            }
            let Some(slots) = namespace_mut(root, &key.namespace) else {
                return Err(CacheError::MalformedEntry);
            };

            if !overwrite {
                if let Some(record) = slots.get(entry) {
                    let live = CacheEntry::from_record(record).map_or(true, |e| !e.is_expired());
                    if live {
                        return Err(CacheError::KeyExists);
                    }
                }
            }

            let stored = CacheEntry::new(value.clone(), ttl);
            slots.insert(entry.to_string(), stored.to_record());
            Ok(())
        })
    }

    fn fetch(&mut self, key: &Key) -> Result<Value> {
        let entry = key.entry()?;
        match self.root.with_root(|root| lookup(root, &key.namespace, entry)) {
            Lookup::Found(stored) => Ok(stored.value),
            Lookup::Missing => Err(CacheError::NotFound),
            Lookup::Malformed => Err(CacheError::MalformedEntry),
            Lookup::Expired => {
                debug!(backend = self.name, "purged expired entry on fetch");
                Err(CacheError::Expired)
            }
        }
    }

    fn exists(&mut self, key: &Key) -> Result<bool> {
        let entry = key.entry()?;
        let found = self.root.with_root(|root| lookup(root, &key.namespace, entry));
        Ok(matches!(found, Lookup::Found(_)))
    }

    fn increment(&mut self, key: &Key, delta: f64) -> Result<()> {
        let entry = key.entry()?;
        self.root.with_root(|root| {
            let Some(slots) = namespace_mut(root, &key.namespace) else {
                return;
            };
            let Some(mut stored) = slots.get(entry).and_then(CacheEntry::from_record) else {
                return;
            };
            if stored.increment(delta) {
                slots.insert(entry.to_string(), stored.to_record());
            }
        });
        Ok(())
    }

    fn remove(&mut self, key: &Key) -> Result<()> {
        let entry = key.entry()?;
        self.root.with_root(|root| {
            if let Some(slots) = namespace_mut(root, &key.namespace) {
                slots.remove(entry);
            }
        });
        Ok(())
    }

    fn invalidate(&mut self, key: &Key, all: bool) -> Result<()> {
        self.root.with_root(|root| {
            if all {
                root.clear();
            } else {
                root.remove(&key.namespace);
            }
        });
        Ok(())
    }

    // == Garbage Collect ==
    fn garbage_collect(&mut self) -> Result<usize> {
        let removed = self.root.with_root(|root| {
            let mut removed = 0;
            for slots in root.values_mut().filter_map(Value::as_object_mut) {
                let before = slots.len();
                slots.retain(|_, record| {
                    CacheEntry::from_record(record).map_or(true, |e| !e.is_expired())
                });
                removed += before - slots.len();
            }
            removed
        });
        Ok(removed)
    }
}
