//! Configuration Module
//!
//! Handles loading and validating cache configuration from environment
//! variables or JSON.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::{PolicyKind, DEFAULT_CAPACITY, DEFAULT_SWEEP_BATCH, DEFAULT_SWEEP_INTERVAL_SECS};
use crate::error::{CacheError, Result};

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Eviction policy backing the cache
    pub policy: PolicyKind,
    /// Maximum number of entries the cache can hold
    pub capacity: usize,
    /// Background sweep interval in seconds
    pub sweep_interval_secs: u64,
    /// Slots visited per sweep batch before the lock is released
    pub sweep_batch: usize,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_POLICY` - `lru` or `lfu` (default: lru)
    /// - `CACHE_CAPACITY` - Maximum cache entries (default: 1000)
    /// - `SWEEP_INTERVAL` - Sweep frequency in seconds (default: 1)
    /// - `SWEEP_BATCH` - Slots per sweep batch (default: 256)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            policy: env_or("CACHE_POLICY", defaults.policy),
            capacity: env_or("CACHE_CAPACITY", defaults.capacity),
            sweep_interval_secs: env_or("SWEEP_INTERVAL", defaults.sweep_interval_secs),
            sweep_batch: env_or("SWEEP_BATCH", defaults.sweep_batch),
        }
    }

    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|err| CacheError::InvalidConfiguration(err.to_string()))
    }

    /// Rejects settings a cache cannot be built with.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(CacheError::InvalidConfiguration(
                "capacity must be positive".to_string(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(CacheError::InvalidConfiguration(
                "sweep interval must be positive".to_string(),
            ));
        }
        if self.sweep_batch == 0 {
            return Err(CacheError::InvalidConfiguration(
                "sweep batch must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::Lru,
            capacity: DEFAULT_CAPACITY,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            sweep_batch: DEFAULT_SWEEP_BATCH,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Ignoring unparsable {}={:?}, using default", name, raw);
            default
        }),
        Err(_) => default,
    }
}
