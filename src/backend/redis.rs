//! Redis Backend Module
//!
//! Stores JSON-encoded values under composite keys and relies on Redis'
//! native TTL eviction.

use redis::{Client, Connection};
use serde_json::Value;
use tracing::debug;

use super::CacheBackend;
use crate::error::{CacheError, Result};
use crate::key::{all_pattern, Key};

const NAME: &str = "redis";

/// Keys requested per `SCAN` round trip
const SCAN_COUNT: usize = 500;

// == Redis Backend ==
pub struct RedisBackend {
    conn: Connection,
}

fn driver_error(err: redis::RedisError) -> CacheError {
    CacheError::backend(NAME, err)
}

impl RedisBackend {
    // == Connect ==
    /// Connects to `host:port`, authenticates when a password is given and
    /// selects database `db`.
    pub fn connect(host: &str, port: u16, db: i64, password: Option<&str>) -> Result<Self> {
        let client = Client::open(format!("redis://{}:{}/", host, port))
            .map_err(|e| CacheError::connection(NAME, e))?;
        let mut conn = client
            .get_connection()
            .map_err(|e| CacheError::connection(NAME, e))?;

        if let Some(password) = password.filter(|p| !p.is_empty()) {
            redis::cmd("AUTH")
                .arg(password)
                .query::<()>(&mut conn)
                .map_err(|e| CacheError::connection(NAME, e))?;
        }
        redis::cmd("SELECT")
            .arg(db)
            .query::<()>(&mut conn)
            .map_err(|e| CacheError::connection(NAME, e))?;

        Ok(Self { conn })
    }

    /// Sends `PING` and checks for `PONG`.
    pub fn probe(&mut self) -> bool {
        redis::cmd("PING")
            .query::<String>(&mut self.conn)
            .is_ok_and(|reply| reply == "PONG")
    }

    /// Collects every key matching `pattern` with cursor-based `SCAN`.
    fn scan(&mut self, pattern: &str) -> Result<Vec<String>> {
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query(&mut self.conn)
                .map_err(driver_error)?;
            keys.extend(batch);
            if next == 0 {
                return Ok(keys);
            }
            cursor = next;
        }
    }
}

impl CacheBackend for RedisBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn store(&mut self, key: &Key, value: &Value, overwrite: bool, ttl: u64) -> Result<()> {
        let composite = key.composite()?;
        let encoded = serde_json::to_string(value).map_err(CacheError::Serialization)?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(composite).arg(encoded);
        if ttl > 0 {
            cmd.arg("EX").arg(ttl);
        }
        if !overwrite {
            cmd.arg("NX");
        }

        // `SET ... NX` replies nil when the key is already present
        let reply: Option<String> = cmd.query(&mut self.conn).map_err(driver_error)?;
        match reply {
            None if !overwrite => Err(CacheError::KeyExists),
            _ => Ok(()),
        }
    }

    fn fetch(&mut self, key: &Key) -> Result<Value> {
        let data: Option<String> = redis::cmd("GET")
            .arg(key.composite()?)
            .query(&mut self.conn)
            .map_err(driver_error)?;

        let data = data.ok_or(CacheError::NotFound)?;
        serde_json::from_str(&data).map_err(CacheError::Deserialization)
    }

    fn exists(&mut self, key: &Key) -> Result<bool> {
        let count: i64 = redis::cmd("EXISTS")
            .arg(key.composite()?)
            .query(&mut self.conn)
            .map_err(driver_error)?;
        Ok(count > 0)
    }

    fn increment(&mut self, key: &Key, delta: f64) -> Result<()> {
        redis::cmd("INCRBYFLOAT")
            .arg(key.composite()?)
            .arg(delta)
            .query::<()>(&mut self.conn)
            .map_err(driver_error)
    }

    fn remove(&mut self, key: &Key) -> Result<()> {
        redis::cmd("DEL")
            .arg(key.composite()?)
            .query::<()>(&mut self.conn)
            .map_err(driver_error)
    }

    fn invalidate(&mut self, key: &Key, all: bool) -> Result<()> {
        let pattern = if all {
            all_pattern()
        } else {
            key.namespace_pattern()
        };
        let keys = self.scan(&pattern)?;
        debug!(count = keys.len(), pattern = %pattern, "deleting redis keys");

        for batch in keys.chunks(SCAN_COUNT) {
            redis::cmd("DEL")
                .arg(batch)
                .query::<()>(&mut self.conn)
                .map_err(driver_error)?;
        }
        Ok(())
    }
}
