//! Eviction Policy Module
//!
//! The capability set every eviction engine implements, the policy tag used
//! to pick one, and the factory that maps a tag to a concrete engine.

use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::cache::lfu::LfuEngine;
use crate::cache::lru::LruEngine;
use crate::cache::slab::SlotId;
use crate::error::{CacheError, Result};

/// Key → slot lookup table shared between an engine and its harness.
///
/// Only the engine writes to it, and only while the harness holds the
/// single-writer lock. The harness reads it without locking to answer
/// `contains_key` and `size`.
pub type LookupTable<K> = Arc<DashMap<K, SlotId>>;

// == Policy Kind ==
/// Selects which eviction engine backs a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// Least recently used
    #[default]
    Lru,
    /// Least frequently used
    Lfu,
}

impl PolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::Lru => "lru",
            PolicyKind::Lfu => "lfu",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" => Ok(PolicyKind::Lru),
            "lfu" => Ok(PolicyKind::Lfu),
            other => Err(CacheError::InvalidConfiguration(format!(
                "unsupported eviction policy '{}'",
                other
            ))),
        }
    }
}

// == Sweep Progress ==
/// Outcome of one bounded sweep batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepProgress {
    /// Entries removed in this batch
    pub removed: usize,
    /// Slot to resume from, or `None` once every slot has been visited
    pub next_cursor: Option<usize>,
}

// == Eviction Policy ==
/// Operations shared by the LRU and LFU engines.
///
/// Engines are plain single-threaded structures; callers must serialize
/// every `&mut self` call. Time is passed in explicitly so lazy expiry and
/// the sweeper evaluate the same predicate against the same clock.
pub trait EvictionPolicy<K, V>: Send {
    fn kind(&self) -> PolicyKind;

    fn capacity(&self) -> usize;

    /// Returns the value for `key`, refreshing its ordering state.
    ///
    /// An expired entry is removed and reported as `NotFound(Expired)`.
    fn get(&mut self, key: &K, now: Instant) -> Result<V>;

    /// Inserts or updates `key`. Updating keeps the original TTL.
    fn put(&mut self, key: K, value: V, ttl: Duration, now: Instant);

    /// Removes `key`, returning its previous value if it was present.
    fn remove(&mut self, key: &K) -> Option<V>;

    /// Table membership only; expiry is not evaluated.
    fn contains_key(&self, key: &K) -> bool;

    /// Number of tracked entries, including expired ones not yet reclaimed.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&mut self);

    /// Handle to the lookup table for lock-free existence and size queries.
    fn lookup_table(&self) -> LookupTable<K>;

    /// Visits at most `budget` slots starting at `cursor` and removes the
    /// expired entries found there.
    fn sweep_expired(&mut self, cursor: usize, budget: usize, now: Instant) -> SweepProgress;

    /// Removes every expired entry in one pass. Returns the number removed.
    fn purge_expired(&mut self, now: Instant) -> usize {
        let mut cursor = 0;
        let mut removed = 0;
        loop {
            let progress = self.sweep_expired(cursor, usize::MAX, now);
            removed += progress.removed;
            match progress.next_cursor {
                Some(next) => cursor = next,
                None => return removed,
            }
        }
    }

    /// Walks the ordering structures and reports the first broken invariant.
    fn check_invariants(&self) -> std::result::Result<(), String>;
}

// == Factory ==
/// Builds the engine for `kind`. This is the only place a policy tag is
/// turned into a concrete engine.
pub fn new_policy<K, V>(kind: PolicyKind, capacity: usize) -> Box<dyn EvictionPolicy<K, V>>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + 'static,
{
    match kind {
        PolicyKind::Lru => Box::new(LruEngine::new(capacity)),
        PolicyKind::Lfu => Box::new(LfuEngine::new(capacity)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_kind_from_str() {
        assert_eq!("lru".parse::<PolicyKind>().unwrap(), PolicyKind::Lru);
        assert_eq!(" LFU ".parse::<PolicyKind>().unwrap(), PolicyKind::Lfu);
        assert!(matches!(
            "fifo".parse::<PolicyKind>(),
            Err(CacheError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_policy_kind_serde() {
        let json = serde_json::to_string(&PolicyKind::Lfu).unwrap();
        assert_eq!(json, "\"lfu\"");
        let kind: PolicyKind = serde_json::from_str("\"lru\"").unwrap();
        assert_eq!(kind, PolicyKind::Lru);
    }

    #[test]
    fn test_factory_maps_kind() {
        let lru = new_policy::<String, u32>(PolicyKind::Lru, 4);
        let lfu = new_policy::<String, u32>(PolicyKind::Lfu, 4);

        assert_eq!(lru.kind(), PolicyKind::Lru);
        assert_eq!(lfu.kind(), PolicyKind::Lfu);
        assert_eq!(lru.capacity(), 4);
        assert!(lfu.is_empty());
    }

    #[test]
    fn test_purge_expired_visits_all_slots() {
        let now = Instant::now();
        let mut policy = new_policy::<u32, u32>(PolicyKind::Lru, 16);
        for key in 0..10 {
            let ttl = if key % 2 == 0 {
                Duration::from_secs(1)
            } else {
                Duration::from_secs(60)
            };
            policy.put(key, key, ttl, now);
        }

        let removed = policy.purge_expired(now + Duration::from_secs(2));
        assert_eq!(removed, 5);
        assert_eq!(policy.len(), 5);
        assert!(policy.check_invariants().is_ok());
    }
}
