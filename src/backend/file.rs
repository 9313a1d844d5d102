//! File Backend Module
//!
//! Stores each entry as `<root>/<namespace hash>/<entry hash>.cache`
//! containing the JSON-encoded value. Files carry no expiry metadata, so TTLs
//! are not enforced by this backend.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::CacheBackend;
use crate::error::{CacheError, Result};
use crate::key::Key;

const EXTENSION: &str = "cache";

// == File Backend ==
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    /// Uses `root` as storage directory, creating it when missing.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if root.as_os_str().is_empty() {
            return Err(CacheError::InvalidArgument("invalid storage path".into()));
        }
        fs::create_dir_all(&root)
            .map_err(|e| CacheError::io(format!("creating {}", root.display()), e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn namespace_dir(&self, key: &Key) -> PathBuf {
        self.root.join(&key.namespace)
    }

    fn entry_path(&self, key: &Key) -> Result<PathBuf> {
        let entry = key.entry()?;
        Ok(self
            .namespace_dir(key)
            .join(format!("{}.{}", entry, EXTENSION)))
    }
}

/// Removes a file or directory tree; a missing path is not an error.
fn remove_path(path: &Path) -> Result<()> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Err(e) if e.kind() != ErrorKind::NotFound => {
            Err(CacheError::io(format!("removing {}", path.display()), e))
        }
        _ => Ok(()),
    }
}

impl CacheBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    fn store(&mut self, key: &Key, value: &Value, overwrite: bool, _ttl: u64) -> Result<()> {
        let dir = self.namespace_dir(key);
        fs::create_dir_all(&dir)
            .map_err(|e| CacheError::io("creating the storage directory", e))?;

        let path = self.entry_path(key)?;
        if !overwrite && path.exists() {
            return Err(CacheError::KeyExists);
        }

        let encoded = serde_json::to_string(value).map_err(CacheError::Serialization)?;
        fs::write(&path, encoded).map_err(|e| CacheError::io("writing the cache file", e))
    }

    fn fetch(&mut self, key: &Key) -> Result<Value> {
        let path = self.entry_path(key)?;
        if !path.exists() {
            return Err(CacheError::NotFound);
        }

        let data = fs::read_to_string(&path)
            .map_err(|e| CacheError::io("reading the cache file", e))?;
        serde_json::from_str(&data).map_err(CacheError::Deserialization)
    }

    fn exists(&mut self, key: &Key) -> Result<bool> {
        Ok(self.entry_path(key)?.is_file())
    }

    fn increment(&mut self, _key: &Key, _delta: f64) -> Result<()> {
        Ok(())
    }

    fn remove(&mut self, key: &Key) -> Result<()> {
        let path = self.entry_path(key)?;
        if path.exists() {
            fs::remove_file(&path).map_err(|e| CacheError::io("removing the cache file", e))?;
        }
        Ok(())
    }

    fn invalidate(&mut self, key: &Key, all: bool) -> Result<()> {
        if !all {
            return remove_path(&self.namespace_dir(key));
        }

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(CacheError::io("listing the storage directory", e)),
        };
        for entry in entries {
            let entry = entry.map_err(|e| CacheError::io("listing the storage directory", e))?;
            remove_path(&entry.path())?;
        }
        Ok(())
    }

    fn supports_increment(&self) -> bool {
        false
    }
}
