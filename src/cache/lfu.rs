//! LFU Engine Module
//!
//! Least Frequently Used eviction with O(1) touch and O(1) eviction.
//!
//! ```text
//!   buckets
//!   ┌──────┬──────────────────────────────┐
//!   │ freq │ head ◄──► ... ◄──► tail      │  (insertion order)
//!   ├──────┼──────────────────────────────┤
//!   │  1   │ [k3] ◄──► [k7]               │  ◄── min_freq
//!   │  3   │ [k1]                         │
//!   └──────┴──────────────────────────────┘
//! ```
//!
//! Nodes live in one slab and are linked within their bucket by `SlotId`.
//! A touched node moves to the tail of the next bucket; eviction takes the
//! head of the `min_freq` bucket, so ties go to the earliest arrival.
//! Non-empty buckets are also chained in ascending frequency order, so when
//! the lowest bucket empties `min_freq` steps to its successor without a
//! scan.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::cache::entry::Entry;
use crate::cache::policy::{EvictionPolicy, LookupTable, PolicyKind, SweepProgress};
use crate::cache::slab::{Slab, SlotId};
use crate::error::{CacheError, Result};

#[derive(Debug)]
struct LfuNode<K, V> {
    entry: Entry<K, V>,
    freq: u64,
    prev: Option<SlotId>,
    next: Option<SlotId>,
}

/// One frequency level. Non-empty buckets also form an ascending chain
/// through `lower`/`higher`, so the next minimum is always one hop away.
#[derive(Debug, Clone, Copy)]
struct Bucket {
    head: Option<SlotId>,
    tail: Option<SlotId>,
    lower: Option<u64>,
    higher: Option<u64>,
}

// == LFU Engine ==
pub struct LfuEngine<K, V> {
    nodes: Slab<LfuNode<K, V>>,
    buckets: HashMap<u64, Bucket>,
    /// Lowest non-empty frequency (head of the bucket chain); 0 only while
    /// the engine is empty
    min_freq: u64,
    table: LookupTable<K>,
    capacity: usize,
}

impl<K, V> LfuEngine<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    // == Constructor ==
    /// Creates an empty engine holding at most `capacity` entries.
    ///
    /// A capacity of zero turns `put` into a no-op.
    pub fn new(capacity: usize) -> Self {
        Self {
            nodes: Slab::new(),
            buckets: HashMap::new(),
            min_freq: 0,
            table: Arc::new(DashMap::new()),
            capacity,
        }
    }

    /// Current access frequency of `key`.
    pub fn frequency(&self, key: &K) -> Option<u64> {
        let id = self.slot_of(key)?;
        self.nodes.get(id).map(|node| node.freq)
    }

    /// Lowest frequency currently held, `None` when empty.
    pub fn min_frequency(&self) -> Option<u64> {
        (!self.nodes.is_empty()).then_some(self.min_freq)
    }

    fn slot_of(&self, key: &K) -> Option<SlotId> {
        self.table.get(key).map(|slot| *slot.value())
    }

    // == Bucket Chain ==
    /// Creates an empty bucket for `freq` right above `lower` in the chain
    /// (at the bottom when `lower` is `None`). No-op if it already exists.
    fn link_bucket(&mut self, freq: u64, lower: Option<u64>) {
        if self.buckets.contains_key(&freq) {
            return;
        }
        let higher = match lower {
            Some(lower) => self.buckets.get(&lower).and_then(|bucket| bucket.higher),
            None => (!self.buckets.is_empty()).then_some(self.min_freq),
        };
        self.buckets.insert(
            freq,
            Bucket {
                head: None,
                tail: None,
                lower,
                higher,
            },
        );

        match lower {
            Some(lower) => {
                if let Some(bucket) = self.buckets.get_mut(&lower) {
                    bucket.higher = Some(freq);
                }
            }
            None => self.min_freq = freq,
        }
        if let Some(higher) = higher {
            if let Some(bucket) = self.buckets.get_mut(&higher) {
                bucket.lower = Some(freq);
            }
        }
    }

    /// Drops the bucket for `freq` and splices its neighbours together.
    fn unlink_bucket(&mut self, freq: u64) {
        let Some(bucket) = self.buckets.remove(&freq) else {
            return;
        };
        match bucket.lower {
            Some(lower) => {
                if let Some(below) = self.buckets.get_mut(&lower) {
                    below.higher = bucket.higher;
                }
            }
            None => self.min_freq = bucket.higher.unwrap_or(0),
        }
        if let Some(higher) = bucket.higher {
            if let Some(above) = self.buckets.get_mut(&higher) {
                above.lower = bucket.lower;
            }
        }
    }

    // == Bucket Linking ==
    /// Appends `id` to the bucket for `freq`, which must already be linked.
    fn push_back(&mut self, id: SlotId, freq: u64) {
        let Some(bucket) = self.buckets.get_mut(&freq) else {
            return;
        };
        let old_tail = bucket.tail;
        if old_tail.is_none() {
            bucket.head = Some(id);
        }
        bucket.tail = Some(id);

        if let Some(tail) = old_tail {
            if let Some(node) = self.nodes.get_mut(tail) {
                node.next = Some(id);
            }
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.freq = freq;
            node.prev = old_tail;
            node.next = None;
        }
    }

    /// Unlinks `id` from its bucket, dropping the bucket if it empties.
    fn unlink(&mut self, id: SlotId) {
        let (freq, prev, next) = match self.nodes.get(id) {
            Some(node) => (node.freq, node.prev, node.next),
            None => return,
        };

        match prev {
            Some(prev) => {
                if let Some(node) = self.nodes.get_mut(prev) {
                    node.next = next;
                }
            }
            None => {
                if let Some(bucket) = self.buckets.get_mut(&freq) {
                    bucket.head = next;
                }
            }
        }
        match next {
            Some(next) => {
                if let Some(node) = self.nodes.get_mut(next) {
                    node.prev = prev;
                }
            }
            None => {
                if let Some(bucket) = self.buckets.get_mut(&freq) {
                    bucket.tail = prev;
                }
            }
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.prev = None;
            node.next = None;
        }

        let emptied = self
            .buckets
            .get(&freq)
            .map_or(false, |bucket| bucket.head.is_none());
        if emptied {
            self.unlink_bucket(freq);
        }
    }

    // == Touch ==
    /// Bumps the frequency of `id` by one.
    fn touch(&mut self, id: SlotId) {
        let freq = match self.nodes.get(id) {
            Some(node) => node.freq,
            None => return,
        };
        // Link the target first so it lands above `freq` even if `freq`
        // empties below
        self.link_bucket(freq + 1, Some(freq));
        self.unlink(id);
        self.push_back(id, freq + 1);
    }

    // == Detach ==
    /// Unlinks `id`, frees its slot and drops its key from the table.
    ///
    /// Shared by explicit removal, eviction, lazy expiry and the sweeper.
    fn detach(&mut self, id: SlotId) -> Option<Entry<K, V>> {
        self.unlink(id);
        let node = self.nodes.remove(id)?;
        self.table.remove(&node.entry.key);
        Some(node.entry)
    }

    // == Evict ==
    /// Removes the earliest-inserted entry of the lowest-frequency bucket.
    fn evict_lfu(&mut self) -> Option<Entry<K, V>> {
        let victim = self.buckets.get(&self.min_freq).and_then(|bucket| bucket.head)?;
        let freq = self.min_freq;
        let evicted = self.detach(victim);
        if evicted.is_some() {
            debug!(
                "LFU eviction: freed slot {} at frequency {}",
                victim.index(),
                freq
            );
        }
        evicted
    }
}

impl<K, V> fmt::Debug for LfuEngine<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LfuEngine")
            .field("len", &self.nodes.len())
            .field("capacity", &self.capacity)
            .field("min_freq", &self.min_freq)
            .field("buckets", &self.buckets.len())
            .finish()
    }
}

impl<K, V> EvictionPolicy<K, V> for LfuEngine<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send,
{
    fn kind(&self) -> PolicyKind {
        PolicyKind::Lfu
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    // == Get ==
    fn get(&mut self, key: &K, now: Instant) -> Result<V> {
        let id = self.slot_of(key).ok_or_else(CacheError::absent)?;

        let expired = match self.nodes.get(id) {
            Some(node) => node.entry.is_expired(now),
            None => return Err(CacheError::absent()),
        };

        if expired {
            self.detach(id);
            debug!("LFU lazy expiry: freed slot {}", id.index());
            return Err(CacheError::expired());
        }

        self.touch(id);
        self.nodes
            .get(id)
            .map(|node| node.entry.value.clone())
            .ok_or_else(CacheError::absent)
    }

    // == Put ==
    fn put(&mut self, key: K, value: V, ttl: Duration, now: Instant) {
        if self.capacity == 0 {
            return;
        }

        // An update counts as an access; created_at and ttl are kept
        if let Some(id) = self.slot_of(&key) {
            if let Some(node) = self.nodes.get_mut(id) {
                node.entry.value = value;
            }
            self.touch(id);
            return;
        }

        if self.len() >= self.capacity {
            self.evict_lfu();
        }

        let id = self.nodes.insert(LfuNode {
            entry: Entry::new(key.clone(), value, ttl, now),
            freq: 1,
            prev: None,
            next: None,
        });
        self.link_bucket(1, None);
        self.push_back(id, 1);
        self.table.insert(key, id);
        trace!("LFU insert: slot {}, {} entries", id.index(), self.len());
    }

    // == Remove ==
    fn remove(&mut self, key: &K) -> Option<V> {
        let id = self.slot_of(key)?;
        self.detach(id).map(|entry| entry.value)
    }

    fn contains_key(&self, key: &K) -> bool {
        self.table.contains_key(key)
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    // == Clear ==
    fn clear(&mut self) {
        self.table.clear();
        self.nodes.clear();
        self.buckets.clear();
        self.min_freq = 0;
    }

    fn lookup_table(&self) -> LookupTable<K> {
        Arc::clone(&self.table)
    }

    // == Sweep ==
    fn sweep_expired(&mut self, cursor: usize, budget: usize, now: Instant) -> SweepProgress {
        let slot_count = self.nodes.slot_count();
        let end = cursor.saturating_add(budget).min(slot_count);
        let mut removed = 0;

        for idx in cursor..end {
            let id = SlotId(idx);
            let expired = self
                .nodes
                .get(id)
                .map_or(false, |node| node.entry.is_expired(now));
            if expired && self.detach(id).is_some() {
                removed += 1;
            }
        }

        SweepProgress {
            removed,
            next_cursor: (end < slot_count).then_some(end),
        }
    }

    // == Invariants ==
    fn check_invariants(&self) -> std::result::Result<(), String> {
        let len = self.len();
        let mut seen = HashSet::new();

        for (&freq, bucket) in &self.buckets {
            if bucket.head.is_none() {
                return Err(format!("empty bucket kept for frequency {}", freq));
            }
            let mut prev = None;
            let mut current = bucket.head;
            while let Some(id) = current {
                if !seen.insert(id) {
                    return Err(format!("slot {} linked twice", id.index()));
                }
                let node = self
                    .nodes
                    .get(id)
                    .ok_or_else(|| format!("dangling link to slot {}", id.index()))?;
                if node.freq != freq {
                    return Err(format!(
                        "slot {} has frequency {} inside bucket {}",
                        id.index(),
                        node.freq,
                        freq
                    ));
                }
                if node.prev != prev {
                    return Err(format!("broken back link at slot {}", id.index()));
                }
                if self.slot_of(&node.entry.key) != Some(id) {
                    return Err(format!("table disagrees for slot {}", id.index()));
                }
                prev = current;
                current = node.next;
            }
            if bucket.tail != prev {
                return Err(format!("bucket {} tail does not match last node", freq));
            }
        }

        if seen.len() != len {
            return Err(format!("buckets hold {} nodes, arena {}", seen.len(), len));
        }
        if self.table.len() != len {
            return Err(format!("table holds {} keys, arena {}", self.table.len(), len));
        }
        if len > 0 {
            let lowest = self.buckets.keys().copied().min();
            if lowest != Some(self.min_freq) {
                return Err(format!(
                    "min_freq {} but lowest bucket is {:?}",
                    self.min_freq, lowest
                ));
            }
        }

        // Bucket chain: ascending, doubly linked, covering every bucket
        let mut chained = 0;
        let mut lower = None;
        let mut current = (!self.buckets.is_empty()).then_some(self.min_freq);
        while let Some(freq) = current {
            let bucket = self
                .buckets
                .get(&freq)
                .ok_or_else(|| format!("chain links to missing bucket {}", freq))?;
            if bucket.lower != lower {
                return Err(format!("broken lower link at bucket {}", freq));
            }
            if lower.map_or(false, |lower| lower >= freq) {
                return Err(format!("bucket chain not ascending at {}", freq));
            }
            chained += 1;
            if chained > self.buckets.len() {
                return Err("cycle in bucket chain".to_string());
            }
            lower = current;
            current = bucket.higher;
        }
        if chained != self.buckets.len() {
            return Err(format!(
                "chain reaches {} of {} buckets",
                chained,
                self.buckets.len()
            ));
        }
        if len > self.capacity {
            return Err(format!("{} entries exceed capacity {}", len, self.capacity));
        }
        Ok(())
    }
}
