//! Mini Cache demo
//!
//! Builds a cache from environment configuration, stores a handful of keys
//! with different TTLs and reads some of them back after a pause.

use std::env;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mini_cache::{Cache, CacheConfig, CacheError, TimeUnit};

/// Capacity used when `CACHE_CAPACITY` is not set; small enough that the
/// demo evicts as well as expires.
const DEMO_CAPACITY: usize = 4;

/// Entry point for the demo.
///
/// # Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the cache (this starts the TTL sweeper)
/// 4. Store entries, wait, store more, read some back
/// 5. Close the cache, stopping the sweeper
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mini_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = CacheConfig::from_env();
    if env::var("CACHE_CAPACITY").is_err() {
        config.capacity = DEMO_CAPACITY;
    }
    info!(
        "Configuration loaded: policy={}, capacity={}, sweep_interval={}s, sweep_batch={}",
        config.policy, config.capacity, config.sweep_interval_secs, config.sweep_batch
    );

    let cache: Cache<String, String> = Cache::from_config(&config)?;

    for (key, result) in run_demo(&cache).await? {
        match result {
            Ok(value) => info!("{} -> {}", key, value),
            Err(err) => warn!("{} -> {}", key, err),
        }
    }
    info!("{} entries tracked", cache.size());

    cache.close().await;
    info!("Demo complete");
    Ok(())
}

/// Puts Key1..Key5 with mixed TTLs, waits two seconds, puts Key6 and Key7,
/// then reads Key3, Key5 and Key4 back.
///
/// With an LRU cache of capacity 4, Key1 is evicted by Key5, Key2 and Key3
/// by Key6 and Key7, and Key4 (one-second TTL) has expired by the reads. A
/// sweep that reclaims Key4 during the pause frees a slot and spares Key3.
async fn run_demo(
    cache: &Cache<String, String>,
) -> anyhow::Result<Vec<(&'static str, Result<String, CacheError>)>> {
    let seeds = [
        ("Key1", 10),
        ("Key2", 3),
        ("Key3", 7),
        ("Key4", 1),
        ("Key5", 8),
    ];
    for (key, ttl_secs) in seeds {
        cache
            .put_with_unit(key.to_string(), format!("Value{}", &key[3..]), ttl_secs, TimeUnit::Seconds)
            .await?;
    }

    tokio::time::sleep(Duration::from_secs(2)).await;

    cache
        .put("Key6".to_string(), "Value6".to_string(), Duration::from_secs(8))
        .await?;
    cache
        .put("Key7".to_string(), "Value7".to_string(), Duration::from_secs(8))
        .await?;

    let mut reads = Vec::new();
    for key in ["Key3", "Key5", "Key4"] {
        reads.push((key, cache.get(&key.to_string()).await));
    }
    Ok(reads)
}
