//! Strategy Module
//!
//! Enumerates the storage strategies a `Cacher` can dispatch to.

use std::fmt;

// == Strategy ==
/// Storage backend selected for a facade instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Strategy {
    /// Map owned by the facade instance
    #[default]
    Local,
    /// Map shared by every facade holding the same `SharedStore` handle
    Shared,
    /// Map stored in the host's session context
    Session,
    Redis,
    Memcached,
    Sqlite,
    /// One JSON file per entry under a storage directory
    File,
}

impl Strategy {
    pub const ALL: [Strategy; 7] = [
        Strategy::Local,
        Strategy::Shared,
        Strategy::Session,
        Strategy::Redis,
        Strategy::Memcached,
        Strategy::Sqlite,
        Strategy::File,
    ];

    /// Resolves a name or alias (case-insensitive), `None` when unrecognized.
    pub fn from_alias(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "local" | "internal" => Some(Strategy::Local),
            "shared" | "internal-shared" => Some(Strategy::Shared),
            "session" => Some(Strategy::Session),
            "redis" => Some(Strategy::Redis),
            "memcached" => Some(Strategy::Memcached),
            "sqlite" | "sqlite3" => Some(Strategy::Sqlite),
            "file" => Some(Strategy::File),
            _ => None,
        }
    }

    /// Resolves a numeric identifier (1..=7), falling back to `Local`.
    pub fn from_id(id: u8) -> Self {
        match id {
            2 => Strategy::Shared,
            3 => Strategy::Session,
            4 => Strategy::Redis,
            5 => Strategy::Memcached,
            6 => Strategy::Sqlite,
            7 => Strategy::File,
            _ => Strategy::Local,
        }
    }

    pub fn id(self) -> u8 {
        match self {
            Strategy::Local => 1,
            Strategy::Shared => 2,
            Strategy::Session => 3,
            Strategy::Redis => 4,
            Strategy::Memcached => 5,
            Strategy::Sqlite => 6,
            Strategy::File => 7,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Strategy::Local => "local",
            Strategy::Shared => "shared",
            Strategy::Session => "session",
            Strategy::Redis => "redis",
            Strategy::Memcached => "memcached",
            Strategy::Sqlite => "sqlite3",
            Strategy::File => "file",
        }
    }

    /// Returns true if the driver for this strategy is compiled in.
    ///
    /// Session storage depends on a host-provided context and is never
    /// reported here.
    pub fn is_available(self) -> bool {
        match self {
            Strategy::Local | Strategy::Shared | Strategy::File => true,
            Strategy::Session => false,
            Strategy::Redis => cfg!(feature = "redis"),
            Strategy::Memcached => cfg!(feature = "memcached"),
            Strategy::Sqlite => cfg!(feature = "sqlite"),
        }
    }

    // == Supported Strategies ==
    /// Lists the strategies usable without a host session context.
    pub fn supported() -> Vec<Strategy> {
        Self::ALL
            .into_iter()
            .filter(|strategy| strategy.is_available())
            .collect()
    }

    /// Checks a strategy name against `supported()`.
    pub fn is_supported(name: &str) -> bool {
        Self::from_alias(name).is_some_and(Strategy::is_available)
    }
}

/// Unrecognized names fall back to `Local`.
impl From<&str> for Strategy {
    fn from(name: &str) -> Self {
        Self::from_alias(name).unwrap_or_default()
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
