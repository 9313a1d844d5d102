//! Multicache - A caching facade over interchangeable storage strategies
//!
//! Stores, fetches, increments and invalidates namespaced entries with
//! optional TTL on local, shared, session, Redis, Memcached, SQLite or file
//! storage through one API.

pub mod backend;
pub mod cacher;
pub mod config;
pub mod error;
pub mod key;
pub mod strategy;

pub use backend::{MemorySession, SessionContext, SharedStore};
pub use cacher::Cacher;
pub use config::Config;
pub use error::{CacheError, Result};
pub use key::{Key, KeyBuilder};
pub use strategy::Strategy;
