//! Integration Tests for the Cacher facade
//!
//! Drives the public API against every backend that runs without an external
//! server: local, shared, session, SQLite and file.

use std::thread::sleep;
use std::time::Duration;

use multicache::{CacheError, Cacher, MemorySession, SharedStore, Strategy};
use serde_json::{json, Value};
use tempfile::TempDir;

// == Helper Functions ==

/// A facade for `strategy`, plus the temp dir backing it when needed.
fn create_cacher(strategy: Strategy, namespace: &str) -> (Cacher, Option<TempDir>) {
    let mut cacher = Cacher::new(strategy);
    cacher.set_namespace(namespace);

    let dir = match strategy {
        Strategy::Sqlite => {
            let dir = tempfile::tempdir().unwrap();
            cacher.connect_to_sqlite(dir.path().join("cache.db")).unwrap();
            Some(dir)
        }
        Strategy::File => {
            let dir = tempfile::tempdir().unwrap();
            cacher.set_storage_directory(dir.path().join("cache")).unwrap();
            Some(dir)
        }
        Strategy::Session => {
            cacher.set_session(Box::new(MemorySession::new()));
            None
        }
        Strategy::Shared => {
            cacher.set_shared_store(SharedStore::new());
            None
        }
        _ => None,
    };
    (cacher, dir)
}

const OFFLINE: [Strategy; 5] = [
    Strategy::Local,
    Strategy::Shared,
    Strategy::Session,
    Strategy::Sqlite,
    Strategy::File,
];

/// Strategies that enforce TTLs on their own
const EXPIRING: [Strategy; 4] = [
    Strategy::Local,
    Strategy::Shared,
    Strategy::Session,
    Strategy::Sqlite,
];

fn sample_values() -> Vec<(&'static str, Value)> {
    vec![
        ("string", json!("Some data that should be cached for next uses 🍭")),
        ("nested", json!({"list": [1, 2, 3, 5, "a", true], "inner": {"x": null}})),
        ("boolean", json!(true)),
        ("integer", json!(10)),
    ]
}

// == Round Trip ==

#[test]
fn test_round_trip_on_every_backend() {
    for strategy in OFFLINE {
        let (mut cacher, _dir) = create_cacher(strategy, "demo");

        for (key, value) in sample_values() {
            cacher.store(key, &value, true, None).unwrap();
            assert_eq!(
                cacher.fetch(key, false).unwrap(),
                Some(value),
                "round trip failed on {}",
                strategy
            );
        }
    }
}

#[test]
fn test_fetch_missing_entry() {
    for strategy in OFFLINE {
        let (mut cacher, _dir) = create_cacher(strategy, "demo");

        assert!(
            matches!(cacher.fetch("missing", false), Err(CacheError::NotFound)),
            "expected NotFound on {}",
            strategy
        );
        assert_eq!(cacher.fetch("missing", true).unwrap(), None);
        assert!(!cacher.exists("missing").unwrap());
    }
}

// == Overwrite Guard ==

#[test]
fn test_overwrite_guard_on_every_backend() {
    for strategy in OFFLINE {
        let (mut cacher, _dir) = create_cacher(strategy, "demo");

        cacher.store("key", "v1", false, None).unwrap();
        assert!(
            matches!(
                cacher.store("key", "v2", false, None),
                Err(CacheError::KeyExists)
            ),
            "expected KeyExists on {}",
            strategy
        );
        cacher.store("key", "v2", true, None).unwrap();
        assert_eq!(cacher.fetch("key", false).unwrap(), Some(json!("v2")));
    }
}

// == TTL ==

#[test]
fn test_ttl_expiry() {
    for strategy in EXPIRING {
        let (mut cacher, _dir) = create_cacher(strategy, "demo");

        cacher.store("short", "value", true, Some(1)).unwrap();
        assert!(cacher.exists("short").unwrap());

        sleep(Duration::from_millis(2100));

        assert!(!cacher.exists("short").unwrap(), "still visible on {}", strategy);
        assert_eq!(cacher.fetch("short", true).unwrap(), None);
    }
}

#[test]
fn test_expired_fetch_reports_expired_on_map_backends() {
    for strategy in [Strategy::Local, Strategy::Shared, Strategy::Session] {
        let (mut cacher, _dir) = create_cacher(strategy, "demo");

        cacher.store("short", "value", true, Some(1)).unwrap();
        sleep(Duration::from_millis(2100));

        assert!(matches!(
            cacher.fetch("short", false),
            Err(CacheError::Expired)
        ));
        // The entry was purged by the first read
        assert!(matches!(
            cacher.fetch("short", false),
            Err(CacheError::NotFound)
        ));
    }
}

#[test]
fn test_default_ttl_applies() {
    let (mut cacher, _dir) = create_cacher(Strategy::Local, "demo");
    cacher.set_default_ttl(1);

    cacher.store("short", "value", true, None).unwrap();
    cacher.store("long", "value", true, Some(3600)).unwrap();
    sleep(Duration::from_millis(2100));

    assert!(!cacher.exists("short").unwrap());
    assert!(cacher.exists("long").unwrap());
}

#[test]
fn test_garbage_collect() {
    for strategy in EXPIRING {
        let (mut cacher, _dir) = create_cacher(strategy, "demo");

        cacher.store("short", &1, true, Some(1)).unwrap();
        cacher.store("long", &2, true, None).unwrap();
        sleep(Duration::from_millis(2100));

        assert_eq!(cacher.garbage_collect().unwrap(), 1, "on {}", strategy);
        assert!(cacher.exists("long").unwrap());
    }
}

#[test]
fn test_file_backend_does_not_collect() {
    let (mut cacher, _dir) = create_cacher(Strategy::File, "demo");
    cacher.store("entry", &1, true, Some(1)).unwrap();

    assert_eq!(cacher.garbage_collect().unwrap(), 0);
    assert!(cacher.exists("entry").unwrap());
}

// == Increment ==

#[test]
fn test_increment_and_decrement() {
    for strategy in [Strategy::Local, Strategy::Shared, Strategy::Session, Strategy::Sqlite] {
        let (mut cacher, _dir) = create_cacher(strategy, "demo");

        cacher.store("numeric", &10, true, None).unwrap();
        cacher.increment("numeric", 4.0).unwrap();
        assert_eq!(cacher.fetch("numeric", false).unwrap(), Some(json!(14)), "on {}", strategy);

        cacher.decrement("numeric", 2.0).unwrap();
        assert_eq!(cacher.fetch("numeric", false).unwrap(), Some(json!(12)));

        // Zero delta is a no-op
        cacher.increment("numeric", 0.0).unwrap();
        assert_eq!(cacher.fetch("numeric", false).unwrap(), Some(json!(12)));
    }
}

#[test]
fn test_increment_non_numeric_is_ignored() {
    for strategy in [Strategy::Local, Strategy::Shared, Strategy::Session, Strategy::Sqlite] {
        let (mut cacher, _dir) = create_cacher(strategy, "demo");

        cacher.store("text", "ten", true, None).unwrap();
        cacher.increment("text", 4.0).unwrap();
        assert_eq!(cacher.fetch("text", false).unwrap(), Some(json!("ten")));
    }
}

#[test]
fn test_increment_on_file_backend_is_a_no_op() {
    let (mut cacher, _dir) = create_cacher(Strategy::File, "demo");

    cacher.store("numeric", &10, true, None).unwrap();
    cacher.increment("numeric", 4.0).unwrap();
    assert_eq!(cacher.fetch("numeric", false).unwrap(), Some(json!(10)));
}

#[test]
fn test_increment_many() {
    let (mut cacher, _dir) = create_cacher(Strategy::Local, "demo");
    cacher.store_many([("a", 1), ("b", 2)], true, None).unwrap();

    cacher.increment_many(&["a", "b"], 10.0).unwrap();
    cacher.decrement_many(&["a"], 1.0).unwrap();

    assert_eq!(cacher.fetch("a", false).unwrap(), Some(json!(10)));
    assert_eq!(cacher.fetch("b", false).unwrap(), Some(json!(12)));
}

// == Batch Operations ==

#[test]
fn test_batch_operations() {
    for strategy in OFFLINE {
        let (mut cacher, _dir) = create_cacher(strategy, "demo");

        cacher
            .store_many([("a", json!(1)), ("b", json!("two"))], true, None)
            .unwrap();

        let values = cacher.fetch_many(&["a", "b", "c"], true, false).unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(values["a"], Some(json!(1)));
        assert_eq!(values["b"], Some(json!("two")));
        assert_eq!(values["c"], None);

        let values = cacher.fetch_many(&["a", "b", "c"], true, true).unwrap();
        assert_eq!(values.len(), 2);
        assert!(!values.contains_key("c"));

        let found = cacher.exists_many(&["a", "c"]).unwrap();
        assert!(found["a"]);
        assert!(!found["c"]);

        assert!(cacher.exists_all(&["a", "b"]).unwrap());
        assert!(!cacher.exists_all(&["a", "c"]).unwrap());

        cacher.remove_many(&["a", "b", "c"]).unwrap();
        assert!(!cacher.exists("a").unwrap());
        assert!(!cacher.exists("b").unwrap());
    }
}

#[test]
fn test_fetch_many_not_quiet_fails_on_missing() {
    let (mut cacher, _dir) = create_cacher(Strategy::Local, "demo");
    cacher.store("a", &1, true, None).unwrap();

    assert!(matches!(
        cacher.fetch_many(&["a", "missing"], false, false),
        Err(CacheError::NotFound)
    ));
}

#[test]
fn test_store_many_stops_at_first_conflict() {
    let (mut cacher, _dir) = create_cacher(Strategy::Local, "demo");
    cacher.store("b", "existing", true, None).unwrap();

    let result = cacher.store_many([("a", 1), ("b", 2), ("c", 3)], false, None);

    assert!(matches!(result, Err(CacheError::KeyExists)));
    // Entries written before the conflict stay, later ones are never written
    assert!(cacher.exists("a").unwrap());
    assert_eq!(cacher.fetch("b", false).unwrap(), Some(json!("existing")));
    assert!(!cacher.exists("c").unwrap());
}

#[test]
fn test_batch_with_empty_key_writes_nothing() {
    let (mut cacher, _dir) = create_cacher(Strategy::Local, "demo");

    assert!(matches!(
        cacher.remove_many(&["a", ""]),
        Err(CacheError::InvalidArgument(_))
    ));
    assert!(matches!(
        cacher.store_many([("a", 1), ("", 2)], true, None),
        Err(CacheError::InvalidArgument(_))
    ));
    assert!(!cacher.exists("a").unwrap());
}

// == Remove ==

#[test]
fn test_remove_is_idempotent() {
    for strategy in OFFLINE {
        let (mut cacher, _dir) = create_cacher(strategy, "demo");

        cacher.store("key", &1, true, None).unwrap();
        cacher.remove("key").unwrap();
        assert!(!cacher.exists("key").unwrap());
        cacher.remove("key").unwrap();
    }
}

// == Namespaces ==

#[test]
fn test_namespace_isolation_on_shared_store() {
    let store = SharedStore::new();
    let mut a = Cacher::new(Strategy::Shared);
    a.set_namespace("a").set_shared_store(store.clone());
    let mut b = Cacher::new(Strategy::Shared);
    b.set_namespace("b").set_shared_store(store.clone());

    a.store("key", "from a", true, None).unwrap();
    b.store("key", "from b", true, None).unwrap();

    assert_eq!(a.fetch("key", false).unwrap(), Some(json!("from a")));
    assert_eq!(b.fetch("key", false).unwrap(), Some(json!("from b")));

    a.invalidate(false).unwrap();
    assert!(!a.exists("key").unwrap());
    assert!(b.exists("key").unwrap());

    a.store("key", "from a", true, None).unwrap();
    a.invalidate(true).unwrap();
    assert!(!a.exists("key").unwrap());
    assert!(!b.exists("key").unwrap());
    assert_eq!(store.namespace_count(), 0);
}

#[test]
fn test_namespace_isolation_on_persistent_backends() {
    for strategy in [Strategy::Sqlite, Strategy::File] {
        let (mut cacher, _dir) = create_cacher(strategy, "a");

        cacher.store("key", "from a", true, None).unwrap();
        cacher.set_namespace("b");
        assert!(!cacher.exists("key").unwrap());
        cacher.store("key", "from b", true, None).unwrap();

        cacher.invalidate(false).unwrap();
        assert!(!cacher.exists("key").unwrap());
        cacher.set_namespace("a");
        assert_eq!(cacher.fetch("key", false).unwrap(), Some(json!("from a")));

        cacher.invalidate(true).unwrap();
        assert!(!cacher.exists("key").unwrap());
    }
}

#[test]
fn test_shared_store_is_visible_across_facades() {
    let store = SharedStore::new();
    let mut a = Cacher::with_shared_store(store.clone());
    let mut b = Cacher::with_shared_store(store);

    a.store("key", "from a", true, None).unwrap();
    assert_eq!(b.fetch("key", true).unwrap(), Some(json!("from a")));

    b.increment("key", 1.0).unwrap();
    b.store("count", &1, true, None).unwrap();
    b.increment("count", 2.0).unwrap();
    assert_eq!(a.fetch("count", false).unwrap(), Some(json!(3)));

    a.remove("key").unwrap();
    assert!(!b.exists("key").unwrap());
}

#[test]
fn test_shared_strategy_without_store_is_unavailable() {
    let mut a = Cacher::new(Strategy::Shared);
    let mut b = Cacher::new(Strategy::Shared);

    assert!(matches!(
        a.store("key", "from a", true, None),
        Err(CacheError::BackendUnavailable(_))
    ));
    assert!(matches!(
        b.fetch("key", true),
        Err(CacheError::BackendUnavailable(_))
    ));
}

#[test]
fn test_local_strategy_is_not_shared() {
    let mut first = Cacher::new(Strategy::Local);
    let mut second = Cacher::new(Strategy::Local);

    first.store("key", &1, true, None).unwrap();
    assert!(!second.exists("key").unwrap());
}

// == Strategy Switching ==

#[test]
fn test_switching_strategy_keeps_backends_apart() {
    let dir = tempfile::tempdir().unwrap();
    let mut cacher = Cacher::new(Strategy::Local);
    cacher.set_storage_directory(dir.path()).unwrap();
    cacher.connect_to_sqlite(":memory:").unwrap();
    assert!(cacher.sqlite_connected(true));

    cacher.store("key", "local", true, None).unwrap();
    cacher.set_strategy(Strategy::File);
    assert!(!cacher.exists("key").unwrap());
    cacher.store("key", "file", true, None).unwrap();
    cacher.set_strategy("sqlite");
    assert!(!cacher.exists("key").unwrap());

    cacher.set_strategy(Strategy::Local);
    assert_eq!(cacher.fetch("key", false).unwrap(), Some(json!("local")));

    // The active strategy keeps its connection
    cacher.set_strategy(Strategy::Sqlite);
    cacher.close_connections(false);
    assert!(cacher.sqlite_connected(false));
    cacher.close_connections(true);
    assert!(!cacher.sqlite_connected(false));
    assert!(matches!(
        cacher.exists("key"),
        Err(CacheError::BackendUnavailable(_))
    ));
}

// == Demo Scenario ==

#[test]
fn test_demo_scenario() {
    for strategy in OFFLINE {
        let (mut cacher, _dir) = create_cacher(strategy, "demo");
        cacher.set_default_ttl(120).set_verbose(true);

        cacher
            .store_many(
                [
                    ("cache-entry", json!("hello")),
                    ("foo", json!("bar")),
                    ("serialised", json!([1, 2, 3, 5, "a", true])),
                    ("numeric", json!(10)),
                ],
                true,
                None,
            )
            .unwrap();

        assert!(cacher.exists("cache-entry").unwrap());
        assert_eq!(
            cacher.fetch("cache-entry", false).unwrap(),
            Some(json!("hello"))
        );

        cacher.increment("numeric", 4.0).unwrap();
        let expected = if strategy == Strategy::File { 10 } else { 14 };
        assert_eq!(cacher.fetch("numeric", false).unwrap(), Some(json!(expected)));

        cacher.remove("cache-entry").unwrap();
        assert!(!cacher.exists("cache-entry").unwrap());

        cacher.invalidate(true).unwrap();
        for key in ["foo", "serialised", "numeric"] {
            assert!(!cacher.exists(key).unwrap(), "{} survived on {}", key, strategy);
        }
    }
}
