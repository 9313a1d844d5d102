//! Configuration Module
//!
//! Handles loading facade and backend settings from environment variables.

use std::env;
use std::path::PathBuf;

use crate::strategy::Strategy;

// == Defaults ==
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_REDIS_PORT: u16 = 6379;
pub const DEFAULT_MEMCACHED_PORT: u16 = 11211;

/// Facade and backend configuration.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Strategy selected when the facade is built
    pub strategy: Strategy,
    /// Namespace prefixed to every key, empty for none
    pub namespace: String,
    /// Default TTL in seconds, 0 = entries never expire
    pub default_ttl: u64,
    /// Log backend failures at warn level
    pub verbose: bool,
    pub redis_host: String,
    pub redis_port: u16,
    /// Redis database index
    pub redis_db: i64,
    pub redis_password: Option<String>,
    /// Memcached servers as `(host, port)`
    pub memcached_servers: Vec<(String, u16)>,
    /// SQLite database file, `:memory:` for an in-memory database
    pub sqlite_path: PathBuf,
    /// Root directory of the file strategy
    pub storage_dir: PathBuf,
}

fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Parses `host:port` pairs separated by commas; a missing port means 11211.
pub fn parse_servers(list: &str) -> Vec<(String, u16)> {
    list.split(',')
        .map(str::trim)
        .filter(|server| !server.is_empty())
        .map(|server| match server.rsplit_once(':') {
            Some((host, port)) => (
                host.to_string(),
                port.parse().unwrap_or(DEFAULT_MEMCACHED_PORT),
            ),
            None => (server.to_string(), DEFAULT_MEMCACHED_PORT),
        })
        .collect()
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_STRATEGY` - Strategy name or alias (default: local)
    /// - `CACHE_NAMESPACE` - Key namespace (default: none)
    /// - `CACHE_DEFAULT_TTL` - Default TTL in seconds (default: 0)
    /// - `CACHE_VERBOSE` - `1`/`true` to log failures at warn level (default: false)
    /// - `REDIS_HOST`, `REDIS_PORT`, `REDIS_DB`, `REDIS_PASSWORD`
    /// - `MEMCACHED_SERVERS` - Comma-separated `host:port` list (default: 127.0.0.1:11211)
    /// - `SQLITE_PATH` - Database file (default: cache.db)
    /// - `CACHE_STORAGE_DIR` - File strategy root (default: cache)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            strategy: non_empty("CACHE_STRATEGY")
                .map(|name| Strategy::from(name.as_str()))
                .unwrap_or(defaults.strategy),
            namespace: env::var("CACHE_NAMESPACE").unwrap_or(defaults.namespace),
            default_ttl: parsed("CACHE_DEFAULT_TTL").unwrap_or(defaults.default_ttl),
            verbose: env::var("CACHE_VERBOSE")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.verbose),
            redis_host: non_empty("REDIS_HOST").unwrap_or(defaults.redis_host),
            redis_port: parsed("REDIS_PORT").unwrap_or(defaults.redis_port),
            redis_db: parsed("REDIS_DB").unwrap_or(defaults.redis_db),
            redis_password: non_empty("REDIS_PASSWORD"),
            memcached_servers: non_empty("MEMCACHED_SERVERS")
                .map(|list| parse_servers(&list))
                .unwrap_or(defaults.memcached_servers),
            sqlite_path: non_empty("SQLITE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.sqlite_path),
            storage_dir: non_empty("CACHE_STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_dir),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strategy: Strategy::Local,
            namespace: String::new(),
            default_ttl: 0,
            verbose: false,
            redis_host: DEFAULT_HOST.to_string(),
            redis_port: DEFAULT_REDIS_PORT,
            redis_db: 0,
            redis_password: None,
            memcached_servers: vec![(DEFAULT_HOST.to_string(), DEFAULT_MEMCACHED_PORT)],
            sqlite_path: PathBuf::from("cache.db"),
            storage_dir: PathBuf::from("cache"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.strategy, Strategy::Local);
        assert_eq!(config.namespace, "");
        assert_eq!(config.default_ttl, 0);
        assert!(!config.verbose);
        assert_eq!(config.redis_port, 6379);
        assert_eq!(
            config.memcached_servers,
            vec![("127.0.0.1".to_string(), 11211)]
        );
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        for name in [
            "CACHE_STRATEGY",
            "CACHE_NAMESPACE",
            "CACHE_DEFAULT_TTL",
            "CACHE_VERBOSE",
            "REDIS_PORT",
            "MEMCACHED_SERVERS",
        ] {
            env::remove_var(name);
        }

        let config = Config::from_env();
        assert_eq!(config.strategy, Strategy::Local);
        assert_eq!(config.namespace, "");
        assert_eq!(config.default_ttl, 0);
        assert!(!config.verbose);
        assert_eq!(config.redis_port, 6379);
        assert_eq!(config.memcached_servers.len(), 1);
    }

    #[test]
    fn test_parse_servers() {
        assert_eq!(
            parse_servers("10.0.0.1:11212, cache-host ,"),
            vec![
                ("10.0.0.1".to_string(), 11212),
                ("cache-host".to_string(), 11211)
            ]
        );
        assert!(parse_servers("").is_empty());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("TRUE"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("no"));
        assert!(!parse_flag(""));
    }
}
