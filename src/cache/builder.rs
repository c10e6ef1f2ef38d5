//! Cache Builder Module
//!
//! Fluent construction of [`Cache`] instances.

use std::hash::Hash;
use std::time::Duration;

use crate::cache::policy::PolicyKind;
use crate::cache::store::Cache;
use crate::config::CacheConfig;
use crate::error::Result;

// == Cache Builder ==
/// Picks a policy and capacity, then builds a running [`Cache`].
///
/// ```no_run
/// # async fn demo() -> mini_cache::Result<()> {
/// use mini_cache::{Cache, CacheBuilder, PolicyKind};
///
/// let cache: Cache<String, u64> = CacheBuilder::new()
///     .policy(PolicyKind::Lfu)
///     .capacity(512)
///     .build()?;
/// # cache.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct CacheBuilder {
    config: CacheConfig,
}

impl CacheBuilder {
    /// Starts from the defaults: LRU, capacity 1000, one-second sweeps.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn policy(mut self, policy: PolicyKind) -> Self {
        self.config.policy = policy;
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Sweep interval, rounded down to whole seconds.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval_secs = interval.as_secs();
        self
    }

    pub fn sweep_batch(mut self, batch: usize) -> Self {
        self.config.sweep_batch = batch;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Validates the settings and builds the cache on the current Tokio
    /// runtime.
    pub fn build<K, V>(self) -> Result<Cache<K, V>>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + 'static,
    {
        Cache::from_config(&self.config)
    }
}

impl From<CacheConfig> for CacheBuilder {
    fn from(config: CacheConfig) -> Self {
        Self { config }
    }
}
