//! Memcached Backend Module
//!
//! Stores JSON-encoded values under composite keys over the ASCII protocol.
//! Memcached only increments by whole numbers and has no pattern scan, so key
//! enumeration goes through `lru_crawler metadump`.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::time::Duration;

use memcache::{Client, CommandError, MemcacheError};
use serde_json::Value;
use tracing::debug;

use super::entry::expiry_timestamp;
use super::CacheBackend;
use crate::error::{CacheError, Result};
use crate::key::{all_prefix, Key};

const NAME: &str = "memcached";

const DUMP_TIMEOUT: Duration = Duration::from_secs(5);

// == Memcached Backend ==
pub struct MemcachedBackend {
    client: Client,
    /// `host:port` of every server, used for key enumeration
    servers: Vec<String>,
}

fn driver_error(err: MemcacheError) -> CacheError {
    CacheError::backend(NAME, err)
}

fn is_key_not_found(err: &MemcacheError) -> bool {
    matches!(err, MemcacheError::CommandError(CommandError::KeyNotFound))
}

/// Longest relative expiration memcached accepts (30 days); larger values
/// are read as absolute Unix timestamps.
const MAX_RELATIVE_TTL: u64 = 60 * 60 * 24 * 30;

/// Memcached expiration argument; 0 keeps the entry until evicted.
///
/// TTLs past 30 days are sent as the absolute expiry timestamp.
fn expiration(ttl: u64) -> u32 {
    if ttl <= MAX_RELATIVE_TTL {
        return u32::try_from(ttl).unwrap_or(u32::MAX);
    }
    u32::try_from(expiry_timestamp(ttl)).unwrap_or(u32::MAX)
}

impl MemcachedBackend {
    // == Connect ==
    /// Connects to every `(host, port)` pair.
    pub fn connect(servers: &[(String, u16)]) -> Result<Self> {
        let servers: Vec<String> = servers
            .iter()
            .map(|(host, port)| format!("{}:{}", host, port))
            .collect();
        let urls: Vec<String> = servers
            .iter()
            .map(|server| format!("memcache://{}?protocol=ascii", server))
            .collect();

        let client = Client::connect(urls).map_err(|e| CacheError::connection(NAME, e))?;
        Ok(Self { client, servers })
    }

    /// Asks every server for its version.
    pub fn probe(&self) -> bool {
        self.client.version().is_ok()
    }

    // == List Keys ==
    /// Enumerates the keys held by every server.
    pub fn list_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for server in &self.servers {
            keys.extend(dump_keys(server).map_err(|e| CacheError::backend(NAME, e))?);
        }
        Ok(keys)
    }
}

/// Reads the key names of one server from `lru_crawler metadump all`.
fn dump_keys(server: &str) -> std::io::Result<Vec<String>> {
    let mut stream = TcpStream::connect(server)?;
    stream.set_read_timeout(Some(DUMP_TIMEOUT))?;
    stream.write_all(b"lru_crawler metadump all\r\n")?;

    let mut keys = Vec::new();
    for line in BufReader::new(stream).lines() {
        let line = line?;
        let line = line.trim_end();
        if line == "END" {
            break;
        }
        if line.starts_with("ERROR") || line.starts_with("BUSY") {
            return Err(std::io::Error::other(format!(
                "metadump rejected by {}: {}",
                server, line
            )));
        }
        let Some(encoded) = line
            .split_whitespace()
            .find_map(|field| field.strip_prefix("key="))
        else {
            continue;
        };
        match urlencoding::decode(encoded) {
            Ok(key) => keys.push(key.into_owned()),
            Err(_) => keys.push(encoded.to_string()),
        }
    }
    Ok(keys)
}

impl CacheBackend for MemcachedBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn store(&mut self, key: &Key, value: &Value, overwrite: bool, ttl: u64) -> Result<()> {
        let composite = key.composite()?;
        let encoded = serde_json::to_string(value).map_err(CacheError::Serialization)?;

        if !overwrite {
            let current: Option<String> = self.client.get(composite).map_err(driver_error)?;
            if current.is_some() {
                return Err(CacheError::KeyExists);
            }
        }

        self.client
            .set(composite, encoded.as_str(), expiration(ttl))
            .map_err(driver_error)
    }

    fn fetch(&mut self, key: &Key) -> Result<Value> {
        let data: Option<String> = self.client.get(key.composite()?).map_err(driver_error)?;

        let data = data.ok_or(CacheError::NotFound)?;
        serde_json::from_str(&data).map_err(CacheError::Deserialization)
    }

    fn exists(&mut self, key: &Key) -> Result<bool> {
        let data: Option<String> = self.client.get(key.composite()?).map_err(driver_error)?;
        Ok(data.is_some())
    }

    /// `delta` is already whole; negative values map to `decr`. A missing
    /// key is left alone like on every other backend.
    fn increment(&mut self, key: &Key, delta: f64) -> Result<()> {
        let composite = key.composite()?;
        let amount = delta.abs() as u64;
        let result = if delta < 0.0 {
            self.client.decrement(composite, amount)
        } else {
            self.client.increment(composite, amount)
        };
        match result {
            Ok(_) => Ok(()),
            Err(err) if is_key_not_found(&err) => {
                debug!("increment skipped, key not found");
                Ok(())
            }
            Err(err) => Err(driver_error(err)),
        }
    }

    fn remove(&mut self, key: &Key) -> Result<()> {
        self.client
            .delete(key.composite()?)
            .map(|_| ())
            .map_err(driver_error)
    }

    fn invalidate(&mut self, key: &Key, all: bool) -> Result<()> {
        let prefix = if all {
            all_prefix()
        } else {
            key.namespace_prefix()
        };
        let keys = self.list_keys()?;

        let mut removed = 0;
        for stored in keys.iter().filter(|stored| stored.starts_with(&prefix)) {
            self.client.delete(stored).map_err(driver_error)?;
            removed += 1;
        }
        debug!(count = removed, prefix = %prefix, "deleted memcached keys");
        Ok(())
    }

    fn supports_float_increment(&self) -> bool {
        false
    }
}
