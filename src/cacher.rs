//! Cacher Module
//!
//! The caching facade: holds the configuration and backend handles, resolves
//! the active backend before every operation and translates its results.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::backend::{
    CacheBackend, FileBackend, LocalRoot, MapBackend, SessionContext, SessionRoot, SharedStore,
};
use crate::config::{Config, DEFAULT_HOST, DEFAULT_MEMCACHED_PORT, DEFAULT_REDIS_PORT};
use crate::error::{CacheError, Result};
use crate::key::{Key, KeyBuilder};
use crate::strategy::Strategy;

#[cfg(feature = "memcached")]
use crate::backend::MemcachedBackend;
#[cfg(feature = "redis")]
use crate::backend::RedisBackend;
#[cfg(feature = "sqlite")]
use crate::backend::SqliteBackend;

#[cfg(feature = "sqlite")]
pub use rusqlite::OpenFlags;

// == Cacher ==
/// Uniform key/value cache over the selected storage strategy.
///
/// # Example
/// ```ignore
/// let mut cacher = Cacher::new(Strategy::Sqlite);
/// cacher.set_namespace("demo").set_default_ttl(120);
/// cacher.connect_to_sqlite("cache.db")?;
/// cacher.store("numeric", &10, true, None)?;
/// cacher.increment("numeric", 4.0)?;
/// ```
pub struct Cacher {
    strategy: Strategy,
    keys: KeyBuilder,
    /// Seconds applied when `store` gets no TTL, 0 = no expiry
    default_ttl: u64,
    verbose: bool,
    /// False only while a connection is being established
    ready: bool,
    local: MapBackend<LocalRoot>,
    shared: Option<MapBackend<SharedStore>>,
    session: Option<MapBackend<SessionRoot>>,
    file: Option<FileBackend>,
    #[cfg(feature = "redis")]
    redis: Option<RedisBackend>,
    #[cfg(feature = "memcached")]
    memcached: Option<MemcachedBackend>,
    #[cfg(feature = "sqlite")]
    sqlite: Option<SqliteBackend>,
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidArgument(
            "key cannot be an empty string".into(),
        ));
    }
    Ok(())
}

fn not_connected(backend: &str) -> CacheError {
    CacheError::BackendUnavailable(format!("{} is not connected", backend))
}

impl Cacher {
    // == Constructor ==
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            keys: KeyBuilder::default(),
            default_ttl: 0,
            verbose: false,
            ready: true,
            local: MapBackend::new("local", LocalRoot::default()),
            shared: None,
            session: None,
            file: None,
            #[cfg(feature = "redis")]
            redis: None,
            #[cfg(feature = "memcached")]
            memcached: None,
            #[cfg(feature = "sqlite")]
            sqlite: None,
        }
    }

    /// Creates a facade using the shared strategy over `store`.
    ///
    /// # Arguments
    /// * `store` - Handle cloned into every facade that should see the same
    ///   entries
    pub fn with_shared_store(store: SharedStore) -> Self {
        let mut cacher = Self::new(Strategy::Shared);
        cacher.set_shared_store(store);
        cacher
    }

    /// Applies strategy, namespace, default TTL and verbosity from `config`.
    ///
    /// Connections are not opened here; see `connect_from_config`.
    pub fn from_config(config: &Config) -> Self {
        let mut cacher = Self::new(config.strategy);
        cacher
            .set_namespace(&config.namespace)
            .set_default_ttl(config.default_ttl)
            .set_verbose(config.verbose);
        cacher
    }

    /// Prepares the backend `strategy` needs, using the settings in `config`.
    pub fn connect_from_config(&mut self, strategy: Strategy, config: &Config) -> Result<()> {
        match strategy {
            Strategy::Redis => self.connect_to_redis(
                &config.redis_host,
                config.redis_port,
                config.redis_db,
                config.redis_password.as_deref(),
            ),
            Strategy::Memcached => self.connect_to_memcached(&config.memcached_servers),
            Strategy::Sqlite => self.connect_to_sqlite(&config.sqlite_path),
            Strategy::File => self.set_storage_directory(&config.storage_dir),
            Strategy::Local | Strategy::Shared | Strategy::Session => Ok(()),
        }
    }

    // == Settings ==
    pub fn set_strategy(&mut self, strategy: impl Into<Strategy>) -> &mut Self {
        self.strategy = strategy.into();
        self
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Sets the namespace prefixed to every key; empty disables namespacing.
    pub fn set_namespace(&mut self, namespace: &str) -> &mut Self {
        self.keys.set_namespace(namespace);
        self
    }

    pub fn namespace(&self) -> &str {
        self.keys.namespace()
    }

    pub fn set_default_ttl(&mut self, ttl: u64) -> &mut Self {
        self.default_ttl = ttl;
        self
    }

    pub fn default_ttl(&self) -> u64 {
        self.default_ttl
    }

    /// Logs backend failures at `warn` instead of `debug` when enabled.
    pub fn set_verbose(&mut self, verbose: bool) -> &mut Self {
        self.verbose = verbose;
        self
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Shares `store` with every other facade holding a clone of it.
    ///
    /// The shared strategy stays unavailable until a store is set.
    pub fn set_shared_store(&mut self, store: SharedStore) -> &mut Self {
        self.shared = Some(MapBackend::new("shared", store));
        self
    }

    pub fn shared_store(&self) -> Option<SharedStore> {
        self.shared.as_ref().map(|shared| shared.root().clone())
    }

    pub fn set_session(&mut self, context: Box<dyn SessionContext>) -> &mut Self {
        self.session = Some(MapBackend::new("session", SessionRoot::new(context)));
        self
    }

    /// Uses `path` for the file strategy, creating the directory if needed.
    pub fn set_storage_directory(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        self.ready = false;
        let result = FileBackend::open(path);
        self.ready = true;
        self.file = Some(self.report("set_storage_directory", result)?);
        Ok(())
    }

    pub fn storage_directory(&self) -> Option<&std::path::Path> {
        self.file.as_ref().map(FileBackend::root)
    }

    /// False while a connection is being established.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    // == Connections ==
    /// Connects to Redis, replacing any previous connection on success.
    ///
    /// # Arguments
    /// * `host` - Server host, `127.0.0.1` when empty
    /// * `port` - Server port, 6379 when 0
    /// * `db` - Database index selected after connecting (negative means 0)
    /// * `password` - Sent with `AUTH` when present and non-empty
    #[cfg(feature = "redis")]
    pub fn connect_to_redis(
        &mut self,
        host: &str,
        port: u16,
        db: i64,
        password: Option<&str>,
    ) -> Result<()> {
        let host = if host.is_empty() { DEFAULT_HOST } else { host };
        let port = if port == 0 { DEFAULT_REDIS_PORT } else { port };

        self.ready = false;
        let result = RedisBackend::connect(host, port, db.max(0), password);
        self.ready = true;

        self.redis = Some(self.report("connect_to_redis", result)?);
        info!(host, port, db, "connected to redis");
        Ok(())
    }

    #[cfg(not(feature = "redis"))]
    pub fn connect_to_redis(
        &mut self,
        _host: &str,
        _port: u16,
        _db: i64,
        _password: Option<&str>,
    ) -> Result<()> {
        Err(CacheError::BackendUnavailable(
            "the redis driver is not compiled in".into(),
        ))
    }

    /// Connects to the given `(host, port)` servers, or to a local server
    /// when the list is empty.
    ///
    /// # Arguments
    /// * `servers` - Memcached servers; keys are distributed across them
    #[cfg(feature = "memcached")]
    pub fn connect_to_memcached(&mut self, servers: &[(String, u16)]) -> Result<()> {
        let local = [(DEFAULT_HOST.to_string(), DEFAULT_MEMCACHED_PORT)];
        let servers = if servers.is_empty() { &local[..] } else { servers };

        self.ready = false;
        let result = MemcachedBackend::connect(servers);
        self.ready = true;

        self.memcached = Some(self.report("connect_to_memcached", result)?);
        info!(servers = servers.len(), "connected to memcached");
        Ok(())
    }

    #[cfg(not(feature = "memcached"))]
    pub fn connect_to_memcached(&mut self, _servers: &[(String, u16)]) -> Result<()> {
        Err(CacheError::BackendUnavailable(
            "the memcached driver is not compiled in".into(),
        ))
    }

    /// Opens the SQLite database at `path` with read-write-create flags.
    pub fn connect_to_sqlite(&mut self, path: impl AsRef<std::path::Path>) -> Result<()> {
        #[cfg(feature = "sqlite")]
        return self.connect_to_sqlite_with_flags(path, None);

        #[cfg(not(feature = "sqlite"))]
        {
            let _ = path;
            Err(CacheError::BackendUnavailable(
                "the sqlite driver is not compiled in".into(),
            ))
        }
    }

    /// Opens the SQLite database and creates the `cache_storage` table.
    ///
    /// # Arguments
    /// * `path` - Database file, or `:memory:` for an in-memory database
    /// * `flags` - Open flags, read-write-create when `None`
    #[cfg(feature = "sqlite")]
    pub fn connect_to_sqlite_with_flags(
        &mut self,
        path: impl AsRef<std::path::Path>,
        flags: Option<OpenFlags>,
    ) -> Result<()> {
        let path = path.as_ref();

        self.ready = false;
        let result = SqliteBackend::open(path, flags);
        self.ready = true;

        self.sqlite = Some(self.report("connect_to_sqlite", result)?);
        info!(path = %path.display(), "connected to sqlite");
        Ok(())
    }

    /// Returns true if connected; `probe` sends `PING` first.
    pub fn redis_connected(&mut self, probe: bool) -> bool {
        #[cfg(feature = "redis")]
        return match self.redis.as_mut() {
            Some(redis) => !probe || redis.probe(),
            None => false,
        };

        #[cfg(not(feature = "redis"))]
        {
            let _ = probe;
            false
        }
    }

    /// Returns true if connected; `probe` asks every server for its version.
    pub fn memcached_connected(&self, probe: bool) -> bool {
        #[cfg(feature = "memcached")]
        return match self.memcached.as_ref() {
            Some(memcached) => !probe || memcached.probe(),
            None => false,
        };

        #[cfg(not(feature = "memcached"))]
        {
            let _ = probe;
            false
        }
    }

    /// Returns true if connected; `probe` checks the table schema.
    pub fn sqlite_connected(&self, probe: bool) -> bool {
        #[cfg(feature = "sqlite")]
        return match self.sqlite.as_ref() {
            Some(sqlite) => !probe || sqlite.probe(),
            None => false,
        };

        #[cfg(not(feature = "sqlite"))]
        {
            let _ = probe;
            false
        }
    }

    pub fn close_redis_connection(&mut self) -> &mut Self {
        #[cfg(feature = "redis")]
        if self.redis.take().is_some() {
            info!("closed redis connection");
        }
        self
    }

    pub fn close_memcached_connection(&mut self) -> &mut Self {
        #[cfg(feature = "memcached")]
        if self.memcached.take().is_some() {
            info!("closed memcached connection");
        }
        self
    }

    pub fn close_sqlite_connection(&mut self) -> &mut Self {
        #[cfg(feature = "sqlite")]
        if let Some(sqlite) = self.sqlite.take() {
            sqlite.close();
            info!("closed sqlite connection");
        }
        self
    }

    /// Closes every connection the active strategy does not use, or all of
    /// them when `all` is set.
    pub fn close_connections(&mut self, all: bool) -> &mut Self {
        if all || self.strategy != Strategy::Redis {
            self.close_redis_connection();
        }
        if all || self.strategy != Strategy::Memcached {
            self.close_memcached_connection();
        }
        if all || self.strategy != Strategy::Sqlite {
            self.close_sqlite_connection();
        }
        self
    }

    // == Backend Resolution ==
    /// Validates the active strategy and returns its backend.
    fn backend(&mut self) -> Result<&mut dyn CacheBackend> {
        let backend: &mut dyn CacheBackend = match self.strategy {
            Strategy::Local => &mut self.local,
            Strategy::Shared => match self.shared.as_mut() {
                Some(shared) => shared,
                None => {
                    return Err(CacheError::BackendUnavailable(
                        "no shared store set".into(),
                    ))
                }
            },
            Strategy::Session => match self.session.as_mut() {
                Some(session) if session.root().is_available() => session,
                _ => {
                    return Err(CacheError::BackendUnavailable(
                        "session is not available".into(),
                    ))
                }
            },
            Strategy::File => match self.file.as_mut() {
                Some(file) => file,
                None => {
                    return Err(CacheError::Configuration(
                        "no storage path defined".into(),
                    ))
                }
            },
            #[cfg(feature = "redis")]
            Strategy::Redis => match self.redis.as_mut() {
                Some(redis) => redis,
                None => return Err(not_connected("redis")),
            },
            #[cfg(feature = "memcached")]
            Strategy::Memcached => match self.memcached.as_mut() {
                Some(memcached) => memcached,
                None => return Err(not_connected("memcached")),
            },
            #[cfg(feature = "sqlite")]
            Strategy::Sqlite => match self.sqlite.as_mut() {
                Some(sqlite) => sqlite,
                None => return Err(not_connected("sqlite")),
            },
            #[allow(unreachable_patterns)]
            other => {
                return Err(CacheError::BackendUnavailable(format!(
                    "the {} driver is not compiled in",
                    other
                )))
            }
        };
        Ok(backend)
    }

    /// Logs a failed operation and passes the result through.
    fn report<T>(&self, operation: &str, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if self.verbose {
                warn!(strategy = %self.strategy, operation, error = %err, "cache operation failed");
            } else {
                debug!(strategy = %self.strategy, operation, error = %err, "cache operation failed");
            }
        }
        result
    }

    fn entry_key(&self, raw: &str) -> Result<Key> {
        validate_key(raw)?;
        Ok(self.keys.build(Some(raw)))
    }

    fn resolve_ttl(&self, ttl: Option<u64>) -> u64 {
        match ttl {
            Some(ttl) if ttl > 0 => ttl,
            _ => self.default_ttl,
        }
    }

    // == Store ==
    /// Stores `value` under `key`.
    ///
    /// # Arguments
    /// * `key` - Raw entry key, must not be empty
    /// * `value` - Any serializable value, stored as JSON
    /// * `overwrite` - Replace an unexpired entry instead of failing with
    ///   `KeyExists`
    /// * `ttl` - Seconds until expiry; `None` or 0 falls back to the default
    ///   TTL
    pub fn store<V: Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &V,
        overwrite: bool,
        ttl: Option<u64>,
    ) -> Result<()> {
        let key = self.entry_key(key)?;
        let value = serde_json::to_value(value).map_err(CacheError::Serialization)?;
        self.store_value(&key, &value, overwrite, ttl)
    }

    fn store_value(&mut self, key: &Key, value: &Value, overwrite: bool, ttl: Option<u64>) -> Result<()> {
        let ttl = self.resolve_ttl(ttl);
        let result = self
            .backend()
            .and_then(|backend| backend.store(key, value, overwrite, ttl));
        self.report("store", result)
    }

    /// Stores every pair; all keys are validated before anything is written.
    ///
    /// Entries are written independently: a failure stops the batch and
    /// leaves earlier entries in place.
    pub fn store_many<K, V, I>(&mut self, entries: I, overwrite: bool, ttl: Option<u64>) -> Result<()>
    where
        K: AsRef<str>,
        V: Serialize,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut prepared = Vec::new();
        for (key, value) in entries {
            let key = self.entry_key(key.as_ref())?;
            let value = serde_json::to_value(&value).map_err(CacheError::Serialization)?;
            prepared.push((key, value));
        }

        for (key, value) in &prepared {
            self.store_value(key, value, overwrite, ttl)?;
        }
        Ok(())
    }

    // == Fetch ==
    /// Returns the stored value.
    ///
    /// # Returns
    /// - `Some(value)` for a live entry
    /// - `None` when `quiet` is set and the entry is missing, expired or
    ///   malformed
    /// - `NotFound`, `Expired` or `MalformedEntry` for those misses otherwise
    pub fn fetch(&mut self, key: &str, quiet: bool) -> Result<Option<Value>> {
        let key = self.entry_key(key)?;
        self.fetch_key(&key, quiet)
    }

    fn fetch_key(&mut self, key: &Key, quiet: bool) -> Result<Option<Value>> {
        match self.backend().and_then(|backend| backend.fetch(key)) {
            Ok(value) => Ok(Some(value)),
            Err(err) if quiet && err.is_miss() => Ok(None),
            Err(err) => self.report("fetch", Err(err)),
        }
    }

    /// Like `fetch`, decoding the value into `T`.
    pub fn fetch_as<T: DeserializeOwned>(&mut self, key: &str, quiet: bool) -> Result<Option<T>> {
        self.fetch(key, quiet)?
            .map(|value| serde_json::from_value(value).map_err(CacheError::Deserialization))
            .transpose()
    }

    /// Fetches every key, validating all of them first.
    ///
    /// # Arguments
    /// * `keys` - Raw entry keys
    /// * `quiet` - Turn misses into `None` instead of failing the batch
    /// * `omit_missing` - Leave missing keys out of the result instead of
    ///   mapping them to `None`
    pub fn fetch_many<K: AsRef<str>>(
        &mut self,
        keys: &[K],
        quiet: bool,
        omit_missing: bool,
    ) -> Result<HashMap<String, Option<Value>>> {
        let keys = self.entry_keys(keys)?;

        let mut values = HashMap::with_capacity(keys.len());
        for (raw, key) in keys {
            let value = self.fetch_key(&key, quiet)?;
            if value.is_some() || !omit_missing {
                values.insert(raw, value);
            }
        }
        Ok(values)
    }

    fn entry_keys<K: AsRef<str>>(&self, keys: &[K]) -> Result<Vec<(String, Key)>> {
        keys.iter()
            .map(|raw| {
                let raw = raw.as_ref();
                self.entry_key(raw).map(|key| (raw.to_string(), key))
            })
            .collect()
    }

    // == Exists ==
    /// Returns true if an unexpired entry is stored under `key`.
    pub fn exists(&mut self, key: &str) -> Result<bool> {
        let key = self.entry_key(key)?;
        self.exists_key(&key)
    }

    fn exists_key(&mut self, key: &Key) -> Result<bool> {
        let result = self.backend().and_then(|backend| backend.exists(key));
        self.report("exists", result)
    }

    pub fn exists_many<K: AsRef<str>>(&mut self, keys: &[K]) -> Result<HashMap<String, bool>> {
        let keys = self.entry_keys(keys)?;

        let mut found = HashMap::with_capacity(keys.len());
        for (raw, key) in keys {
            let exists = self.exists_key(&key)?;
            found.insert(raw, exists);
        }
        Ok(found)
    }

    /// Returns true if every key exists, stopping at the first absent one.
    pub fn exists_all<K: AsRef<str>>(&mut self, keys: &[K]) -> Result<bool> {
        let keys = self.entry_keys(keys)?;

        for (_, key) in keys {
            if !self.exists_key(&key)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    // == Increment ==
    /// Adds `delta` to a numeric entry; non-numeric and missing entries are
    /// left alone.
    ///
    /// Memcached truncates the delta toward zero. The file strategy cannot
    /// increment and leaves the entry unchanged.
    ///
    /// # Arguments
    /// * `key` - Raw entry key
    /// * `delta` - Finite amount to add, 0 is a no-op
    pub fn increment(&mut self, key: &str, delta: f64) -> Result<()> {
        let key = self.entry_key(key)?;
        self.increment_key(&key, delta)
    }

    fn increment_key(&mut self, key: &Key, delta: f64) -> Result<()> {
        if delta == 0.0 {
            return Ok(());
        }
        if !delta.is_finite() {
            return Err(CacheError::InvalidArgument(
                "increment delta must be finite".into(),
            ));
        }

        let verbose = self.verbose;
        let result = self.backend().and_then(|backend| {
            if !backend.supports_increment() {
                if verbose {
                    warn!(backend = backend.name(), "increment is not supported, entry left unchanged");
                }
                return Ok(());
            }

            let mut delta = delta;
            if !backend.supports_float_increment() {
                let whole = delta.trunc();
                if verbose && whole != delta {
                    warn!(
                        backend = backend.name(),
                        from = delta,
                        to = whole,
                        "fractional increment delta converted to an integer"
                    );
                }
                delta = whole;
            }
            if delta == 0.0 {
                return Ok(());
            }
            backend.increment(key, delta)
        });
        self.report("increment", result)
    }

    pub fn increment_many<K: AsRef<str>>(&mut self, keys: &[K], delta: f64) -> Result<()> {
        for (_, key) in self.entry_keys(keys)? {
            self.increment_key(&key, delta)?;
        }
        Ok(())
    }

    /// Subtracts `delta` from a numeric entry.
    pub fn decrement(&mut self, key: &str, delta: f64) -> Result<()> {
        self.increment(key, -delta)
    }

    pub fn decrement_many<K: AsRef<str>>(&mut self, keys: &[K], delta: f64) -> Result<()> {
        self.increment_many(keys, -delta)
    }

    // == Remove ==
    /// Deletes the entry; removing a missing entry succeeds.
    pub fn remove(&mut self, key: &str) -> Result<()> {
        let key = self.entry_key(key)?;
        self.remove_key(&key)
    }

    fn remove_key(&mut self, key: &Key) -> Result<()> {
        let result = self.backend().and_then(|backend| backend.remove(key));
        self.report("remove", result)
    }

    pub fn remove_many<K: AsRef<str>>(&mut self, keys: &[K]) -> Result<()> {
        for (_, key) in self.entry_keys(keys)? {
            self.remove_key(&key)?;
        }
        Ok(())
    }

    // == Invalidate ==
    /// Drops every entry written by the facade (`all`), or only the active
    /// namespace's entries.
    pub fn invalidate(&mut self, all: bool) -> Result<()> {
        let key = self.keys.build(None);
        let result = self
            .backend()
            .and_then(|backend| backend.invalidate(&key, all));
        self.report("invalidate", result)
    }

    // == Garbage Collect ==
    /// Purges expired entries where the backend can scan for them, returning
    /// the number removed. Redis, Memcached and file storage report 0.
    pub fn garbage_collect(&mut self) -> Result<usize> {
        let result = self.backend().and_then(|backend| backend.garbage_collect());
        let removed = self.report("garbage_collect", result)?;
        debug!(strategy = %self.strategy, removed, "garbage collection finished");
        Ok(removed)
    }
}

impl Default for Cacher {
    fn default() -> Self {
        Self::new(Strategy::Local)
    }
}
