//! Multicache demo
//!
//! Runs the same store/fetch/increment/remove/invalidate cycle against every
//! supported strategy.
//!
//! # Run Sequence
//! 1. Initialize tracing subscriber for logging
//! 2. Load configuration from environment variables
//! 3. For each supported strategy, connect its backend and run the cycle
//!    (the shared strategy gets a store owned by the demo)
//! 4. Close all connections

use std::time::Instant;

use anyhow::Context;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use multicache::{Cacher, Config, SharedStore, Strategy};

const NAMESPACE: &str = "demo";
const DEFAULT_TTL: u64 = 120;
const INCREMENT: f64 = 4.0;

fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "multicache=info,multicache_demo=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::from_env();
    if config.namespace.is_empty() {
        config.namespace = NAMESPACE.to_string();
    }
    if config.default_ttl == 0 {
        config.default_ttl = DEFAULT_TTL;
    }
    config.verbose = true;

    let strategies = Strategy::supported();
    let names: Vec<&str> = strategies.iter().map(|s| s.name()).collect();
    info!("Supported strategies: {}", names.join(", "));

    let total = Instant::now();
    let mut cacher = Cacher::from_config(&config);
    cacher.set_shared_store(SharedStore::new());

    for strategy in strategies {
        info!("Starting test using \"{}\" as strategy...", strategy);
        if let Err(err) = cacher.connect_from_config(strategy, &config) {
            warn!(error = %err, "Skipping {}: backend not reachable", strategy);
            continue;
        }
        cacher.set_strategy(strategy);

        let start = Instant::now();
        if let Err(err) = run_cycle(&mut cacher) {
            warn!("Test using \"{}\" failed: {:#}", strategy, err);
            continue;
        }
        info!(
            "Test completed in {:.6} seconds.",
            start.elapsed().as_secs_f64()
        );
    }

    cacher.close_connections(true);
    info!(
        "All tests completed in {:.6} seconds.",
        total.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Pushes a few entries, reads them back, increments, removes and clears.
fn run_cycle(cacher: &mut Cacher) -> anyhow::Result<()> {
    info!("Pushing some elements into the cache...");
    cacher
        .store_many(
            [
                (
                    "cache-entry",
                    json!("Some data that should be cached for next uses 🍭"),
                ),
                ("foo", json!("bar")),
                ("serialised", json!([1, 2, 3, 5, "a", true])),
                ("numeric", json!(10)),
            ],
            true,
            None,
        )
        .context("pushing elements")?;

    let exists = cacher.exists("cache-entry")?;
    info!("Does the element exist? {}", if exists { "Yes." } else { "No." });

    let value = cacher.fetch("cache-entry", true)?;
    info!("Value: {}", value.unwrap_or_default());

    cacher
        .increment("numeric", INCREMENT)
        .context("incrementing the numeric entry")?;
    let numeric = cacher.fetch("numeric", false)?;
    info!(
        "Incremented value now is: {}",
        numeric.unwrap_or_default()
    );

    cacher.remove("cache-entry")?;
    info!("The element has been removed, dropping all elements from the cache...");
    cacher.invalidate(true)?;
    info!("Cache content cleared.");
    Ok(())
}
