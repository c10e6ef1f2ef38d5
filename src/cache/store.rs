//! Cache Store Module
//!
//! The thread-safe cache handle. Every operation that touches ordering state
//! (including `get`) runs under one async mutex around the policy engine;
//! `contains_key` and `size` read the engine's concurrent lookup table
//! without taking that lock.

use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::cache::entry::TimeUnit;
use crate::cache::policy::{new_policy, EvictionPolicy, LookupTable, PolicyKind, SweepProgress};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::tasks::{spawn_sweeper, SweeperHandle};

type BoxedPolicy<K, V> = Box<dyn EvictionPolicy<K, V>>;

// == Shared State ==
/// State shared between a cache handle and its sweeper task.
pub(crate) struct Shared<K, V> {
    /// Single-writer lock around the ordering structures
    policy: Mutex<BoxedPolicy<K, V>>,
    closed: AtomicBool,
}

impl<K, V> Shared<K, V> {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Runs one bounded sweep batch under the single-writer lock.
    ///
    /// Returns `None` once the cache has been closed.
    pub(crate) async fn sweep_batch(&self, cursor: usize, budget: usize) -> Option<SweepProgress> {
        let mut policy = self.policy.lock().await;
        if self.is_closed() {
            return None;
        }
        Some(policy.sweep_expired(cursor, budget, Instant::now()))
    }
}

// == Cache ==
/// Generic in-process cache with a pluggable eviction policy and per-entry
/// TTL.
///
/// Build one with [`CacheBuilder`](crate::CacheBuilder) or
/// [`Cache::from_config`]. Building spawns the background sweeper on the
/// current Tokio runtime; [`Cache::close`] stops it. Share a cache between
/// tasks by wrapping it in an `Arc`.
pub struct Cache<K, V> {
    shared: Arc<Shared<K, V>>,
    table: LookupTable<K>,
    kind: PolicyKind,
    capacity: usize,
    pub(crate) sweeper: Mutex<Option<SweeperHandle>>,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + 'static,
{
    // == Constructors ==
    /// Creates a cache with the given policy and capacity and default sweep
    /// settings.
    pub fn new(kind: PolicyKind, capacity: usize) -> Result<Self> {
        Self::from_config(&CacheConfig {
            policy: kind,
            capacity,
            ..CacheConfig::default()
        })
    }

    /// Creates a cache from a validated configuration and starts its sweeper.
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        config.validate()?;

        let policy: BoxedPolicy<K, V> = new_policy(config.policy, config.capacity);
        let table = policy.lookup_table();
        let shared = Arc::new(Shared {
            policy: Mutex::new(policy),
            closed: AtomicBool::new(false),
        });

        let sweeper = spawn_sweeper(
            Arc::clone(&shared),
            config.sweep_interval(),
            config.sweep_batch,
        )?;

        info!(
            "Cache created: policy={}, capacity={}, sweep_interval={}s",
            config.policy, config.capacity, config.sweep_interval_secs
        );

        Ok(Self {
            shared,
            table,
            kind: config.policy,
            capacity: config.capacity,
            sweeper: Mutex::new(Some(sweeper)),
        })
    }

    /// Acquires the single-writer lock, failing fast once closed.
    async fn lock(&self) -> Result<MutexGuard<'_, BoxedPolicy<K, V>>> {
        let guard = self.shared.policy.lock().await;
        if self.shared.is_closed() {
            return Err(CacheError::Closed);
        }
        Ok(guard)
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Fails with `NotFound(Absent)` for unknown keys and `NotFound(Expired)`
    /// for entries whose TTL has elapsed; the latter are removed as a side
    /// effect.
    pub async fn get(&self, key: &K) -> Result<V> {
        let mut policy = self.lock().await?;
        let result = policy.get(key, Instant::now());
        if let Err(CacheError::NotFound { reason }) = &result {
            trace!("Cache miss ({})", reason);
        }
        result
    }

    // == Put ==
    /// Stores a key-value pair.
    ///
    /// Updating an existing key replaces its value and refreshes its
    /// ordering, but keeps the TTL set by the first write.
    pub async fn put(&self, key: K, value: V, ttl: Duration) -> Result<()> {
        let mut policy = self.lock().await?;
        policy.put(key, value, ttl, Instant::now());
        Ok(())
    }

    /// Stores a key-value pair with a TTL of `amount` × `unit`.
    ///
    /// Zero or negative amounts are accepted and expire on next access.
    pub async fn put_with_unit(&self, key: K, value: V, amount: i64, unit: TimeUnit) -> Result<()> {
        self.put(key, value, unit.to_duration(amount)).await
    }

    // == Remove ==
    /// Removes a key, returning its previous value if it was present.
    pub async fn remove(&self, key: &K) -> Result<Option<V>> {
        let mut policy = self.lock().await?;
        Ok(policy.remove(key))
    }

    // == Contains Key ==
    /// Checks whether a key is tracked. Expiry is not evaluated, so an
    /// expired entry that has not been reclaimed yet still reports `true`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.table.contains_key(key)
    }

    // == Size ==
    /// Returns the number of tracked entries.
    pub fn size(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    // == Clear ==
    /// Removes every entry. Clearing an empty cache is a no-op.
    pub async fn clear(&self) -> Result<()> {
        let mut policy = self.lock().await?;
        policy.clear();
        debug!("Cache cleared");
        Ok(())
    }

    pub fn policy(&self) -> PolicyKind {
        self.kind
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    // == Close ==
    /// Stops the sweeper and discards all entries.
    ///
    /// Returns only once the sweeper task has finished and the entries are
    /// gone, including when several callers close concurrently. Calling it
    /// again is a no-op; every other operation fails with `Closed`
    /// afterwards.
    pub async fn close(&self) {
        // Held until the state is cleared so a concurrent close cannot
        // return early
        let mut sweeper = self.sweeper.lock().await;
        let already_closed = self.shared.closed.swap(true, Ordering::AcqRel);

        if let Some(handle) = sweeper.take() {
            handle.stop().await;
        }
        if already_closed {
            return;
        }

        self.shared.policy.lock().await.clear();
        info!("Cache closed");
    }

    /// Validates the ordering structures; used by tests to check consistency
    /// after concurrent traffic.
    pub async fn check_invariants(&self) -> std::result::Result<(), String> {
        self.shared.policy.lock().await.check_invariants()
    }
}

impl<K, V> Drop for Cache<K, V> {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}
