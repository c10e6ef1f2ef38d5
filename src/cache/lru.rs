//! LRU Engine Module
//!
//! Least Recently Used eviction over an arena-backed doubly linked list.
//!
//! ```text
//!   slot 0 (HEAD) ◄──► [MRU] ◄──► ... ◄──► [LRU] ◄──► slot 1 (TAIL)
//! ```
//!
//! The two sentinels live in reserved slots and are never evicted, so every
//! real node always has both neighbours and relinking never branches on
//! "first" or "last". The lookup table maps keys to slots for O(1) access.

use std::collections::HashSet;
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

const HEAD: SlotId = SlotId(0);
const TAIL: SlotId = SlotId(1);
const SENTINELS: usize = 2;

#[derive(Debug)]
struct LruNode<K, V> {
    /// `None` only for the two sentinels
    entry: Option<Entry<K, V>>,
    prev: SlotId,
    next: SlotId,
}

// == LRU Engine ==
/// Recency-ordered cache engine.
///
/// Front (next to `HEAD`) = most recently used, back (next to `TAIL`) =
/// least recently used and the next eviction candidate.
pub struct LruEngine<K, V> {
    nodes: Slab<LruNode<K, V>>,
    table: LookupTable<K>,
    capacity: usize,
}

impl<K, V> LruEngine<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    // == Constructor ==
    /// Creates an empty engine holding at most `capacity` entries.
    ///
    /// A capacity of zero stores nothing.
    pub fn new(capacity: usize) -> Self {
        let mut engine = Self {
            nodes: Slab::new(),
            table: Arc::new(DashMap::new()),
            capacity,
        };
        engine.install_sentinels();
        engine
    }

    fn install_sentinels(&mut self) {
        debug_assert!(self.nodes.is_empty());
        let head = self.nodes.insert(LruNode {
            entry: None,
            prev: HEAD,
            next: TAIL,
        });
        let tail = self.nodes.insert(LruNode {
            entry: None,
            prev: HEAD,
            next: TAIL,
        });
        debug_assert_eq!((head, tail), (HEAD, TAIL));
    }

    // == Linking ==
    fn unlink(&mut self, id: SlotId) {
        let (prev, next) = match self.nodes.get(id) {
            Some(node) => (node.prev, node.next),
            None => return,
        };
        if let Some(node) = self.nodes.get_mut(prev) {
            node.next = next;
        }
        if let Some(node) = self.nodes.get_mut(next) {
            node.prev = prev;
        }
    }

    fn attach_front(&mut self, id: SlotId) {
        let first = self.nodes.get(HEAD).map(|head| head.next).unwrap_or(TAIL);
        if let Some(node) = self.nodes.get_mut(id) {
            node.prev = HEAD;
            node.next = first;
        }
        if let Some(node) = self.nodes.get_mut(first) {
            node.prev = id;
        }
        if let Some(head) = self.nodes.get_mut(HEAD) {
            head.next = id;
        }
    }

    // == Move To Front ==
    /// Marks `id` as most recently used.
    fn move_to_front(&mut self, id: SlotId) {
        if self.nodes.get(HEAD).map(|head| head.next) == Some(id) {
            return;
        }
        self.unlink(id);
        self.attach_front(id);
    }

    // == Detach ==
    /// Unlinks `id`, frees its slot and drops its key from the table.
    ///
    /// Every removal path (explicit, eviction, lazy expiry, sweep) goes
    /// through here. Sentinel slots are refused.
    fn detach(&mut self, id: SlotId) -> Option<Entry<K, V>> {
        if id.index() < SENTINELS {
            return None;
        }
        self.unlink(id);
        let entry = self.nodes.remove(id)?.entry?;
        self.table.remove(&entry.key);
        Some(entry)
    }

    // == Evict ==
    /// Removes the least recently used entry, if any.
    fn evict_lru(&mut self) -> Option<Entry<K, V>> {
        let last = self.nodes.get(TAIL).map(|tail| tail.prev)?;
        if last == HEAD {
            return None;
        }
        let evicted = self.detach(last);
        if evicted.is_some() {
            debug!("LRU eviction: freed slot {}", last.index());
        }
        evicted
    }

    fn slot_of(&self, key: &K) -> Option<SlotId> {
        self.table.get(key).map(|slot| *slot.value())
    }

    fn entry_count(&self) -> usize {
        self.nodes.len() - SENTINELS
    }

    // == Ordered Keys ==
    /// Returns keys from most to least recently used.
    pub fn keys_mru(&self) -> Vec<K> {
        let count = self.entry_count();
        let mut keys = Vec::with_capacity(count);
        let mut current = self.nodes.get(HEAD).map(|head| head.next);
        while let Some(id) = current {
            if id == TAIL {
                break;
            }
            match self.nodes.get(id) {
                Some(node) => {
                    if let Some(entry) = &node.entry {
                        keys.push(entry.key.clone());
                    }
                    current = Some(node.next);
                }
                None => break,
            }
            if keys.len() > count {
                break;
            }
        }
        keys
    }
}

impl<K, V> fmt::Debug for LruEngine<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruEngine")
            .field("len", &(self.nodes.len() - SENTINELS))
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl<K, V> EvictionPolicy<K, V> for LruEngine<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send,
{
    fn kind(&self) -> PolicyKind {
        PolicyKind::Lru
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    // == Get ==
    fn get(&mut self, key: &K, now: Instant) -> Result<V> {
        let id = self.slot_of(key).ok_or_else(CacheError::absent)?;

        let expired = match self.nodes.get(id).and_then(|node| node.entry.as_ref()) {
            Some(entry) => entry.is_expired(now),
            None => return Err(CacheError::absent()),
        };

        if expired {
            self.detach(id);
            debug!("LRU lazy expiry: freed slot {}", id.index());
            return Err(CacheError::expired());
        }

        self.move_to_front(id);
        self.nodes
            .get(id)
            .and_then(|node| node.entry.as_ref())
            .map(|entry| entry.value.clone())
            .ok_or_else(CacheError::absent)
    }

    // == Put ==
    fn put(&mut self, key: K, value: V, ttl: Duration, now: Instant) {
        if self.capacity == 0 {
            return;
        }

        // Overwrite keeps created_at and ttl
        if let Some(id) = self.slot_of(&key) {
            if let Some(entry) = self.nodes.get_mut(id).and_then(|node| node.entry.as_mut()) {
                entry.value = value;
            }
            self.move_to_front(id);
            return;
        }

        if self.len() >= self.capacity {
            self.evict_lru();
        }

        let id = self.nodes.insert(LruNode {
            entry: Some(Entry::new(key.clone(), value, ttl, now)),
            prev: HEAD,
            next: TAIL,
        });
        self.attach_front(id);
        self.table.insert(key, id);
        trace!("LRU insert: slot {}, {} entries", id.index(), self.len());
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
        self.entry_count()
    }

    // == Clear ==
    fn clear(&mut self) {
        self.table.clear();
        self.nodes.clear();
        self.install_sentinels();
    }

    fn lookup_table(&self) -> LookupTable<K> {
        Arc::clone(&self.table)
    }

    // == Sweep ==
    fn sweep_expired(&mut self, cursor: usize, budget: usize, now: Instant) -> SweepProgress {
        let slot_count = self.nodes.slot_count();
        let end = cursor.saturating_add(budget).min(slot_count);
        let mut removed = 0;

        for idx in cursor.max(SENTINELS)..end {
            let id = SlotId(idx);
            let expired = self
                .nodes
                .get(id)
                .and_then(|node| node.entry.as_ref())
                .map_or(false, |entry| entry.is_expired(now));
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
        let mut forward = Vec::with_capacity(len);
        let mut prev = HEAD;
        let mut current = self.nodes.get(HEAD).ok_or("missing head sentinel")?.next;

        while current != TAIL {
            if !seen.insert(current) {
                return Err(format!("cycle at slot {}", current.index()));
            }
            let node = self
                .nodes
                .get(current)
                .ok_or_else(|| format!("dangling link to slot {}", current.index()))?;
            if node.prev != prev {
                return Err(format!("broken back link at slot {}", current.index()));
            }
            let entry = node
                .entry
                .as_ref()
                .ok_or_else(|| format!("sentinel inside list at slot {}", current.index()))?;
            if self.slot_of(&entry.key) != Some(current) {
                return Err(format!("table disagrees for slot {}", current.index()));
            }
            forward.push(current);
            prev = current;
            current = node.next;
        }

        let tail = self.nodes.get(TAIL).ok_or("missing tail sentinel")?;
        if tail.prev != prev {
            return Err("tail back link does not match last node".to_string());
        }
        if forward.len() != len {
            return Err(format!("list holds {} nodes, arena {}", forward.len(), len));
        }
        if self.table.len() != len {
            return Err(format!("table holds {} keys, list {}", self.table.len(), len));
        }

        let mut backward = Vec::with_capacity(len);
        let mut current = tail.prev;
        while current != HEAD && backward.len() <= len {
            backward.push(current);
            current = self
                .nodes
                .get(current)
                .map(|node| node.prev)
                .ok_or("dangling back link")?;
        }
        backward.reverse();
        if backward != forward {
            return Err("backward traversal differs from forward traversal".to_string());
        }
        if len > self.capacity {
            return Err(format!("{} entries exceed capacity {}", len, self.capacity));
        }
        Ok(())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    const LONG: Duration = Duration::from_secs(300);

    fn engine(capacity: usize) -> LruEngine<&'static str, u32> {
        LruEngine::new(capacity)
    }

    #[test]
    fn test_lru_new() {
        let lru = engine(4);
        assert!(lru.is_empty());
        assert_eq!(lru.len(), 0);
        assert!(lru.check_invariants().is_ok());
    }

    #[test]
    fn test_put_and_get() {
        let now = Instant::now();
        let mut lru = engine(4);

        lru.put("a", 1, LONG, now);
        assert_eq!(lru.get(&"a", now), Ok(1));
        assert_eq!(lru.len(), 1);
        assert!(lru.contains_key(&"a"));
    }

    #[test]
    fn test_get_absent() {
        let mut lru = engine(4);
        assert_eq!(lru.get(&"missing", Instant::now()), Err(CacheError::absent()));
    }

    #[test]
    fn test_eviction_follows_recency() {
        let now = Instant::now();
        let mut lru = engine(2);

        lru.put("a", 1, LONG, now);
        lru.put("b", 2, LONG, now);
        // a becomes MRU, so b is evicted next
        assert_eq!(lru.get(&"a", now), Ok(1));
        lru.put("c", 3, LONG, now);

        assert_eq!(lru.get(&"b", now), Err(CacheError::absent()));
        assert_eq!(lru.get(&"a", now), Ok(1));
        assert_eq!(lru.get(&"c", now), Ok(3));
        assert!(lru.check_invariants().is_ok());
    }

    #[test]
    fn test_order_after_multiple_touches() {
        let now = Instant::now();
        let mut lru = engine(8);

        for key in ["a", "b", "c"] {
            lru.put(key, 0, LONG, now);
        }
        for key in ["a", "c", "b"] {
            lru.get(&key, now).unwrap();
        }

        assert_eq!(lru.keys_mru(), vec!["b", "c", "a"]);
        assert!(lru.check_invariants().is_ok());
    }

    #[test]
    fn test_overwrite_moves_to_front() {
        let now = Instant::now();
        let mut lru = engine(2);

        lru.put("a", 1, LONG, now);
        lru.put("b", 2, LONG, now);
        lru.put("a", 10, LONG, now);
        lru.put("c", 3, LONG, now);

        assert_eq!(lru.len(), 2);
        assert_eq!(lru.get(&"a", now), Ok(10));
        assert!(!lru.contains_key(&"b"));
    }

    #[test]
    fn test_overwrite_keeps_original_ttl() {
        let now = Instant::now();
        let mut lru = engine(4);

        lru.put("a", 1, Duration::from_secs(1), now);
        lru.put("a", 2, Duration::from_secs(60), now + Duration::from_millis(500));

        assert_eq!(
            lru.get(&"a", now + Duration::from_millis(1001)),
            Err(CacheError::expired())
        );
    }

    #[test]
    fn test_lazy_expiry_removes_entry() {
        let now = Instant::now();
        let mut lru = engine(4);

        lru.put("a", 1, Duration::from_secs(1), now);
        lru.put("b", 2, LONG, now);

        let later = now + Duration::from_millis(1100);
        assert_eq!(lru.get(&"a", later), Err(CacheError::expired()));
        assert!(!lru.contains_key(&"a"));
        assert_eq!(lru.len(), 1);
        // A second lookup reports absence, not expiry
        assert_eq!(lru.get(&"a", later), Err(CacheError::absent()));
        assert!(lru.check_invariants().is_ok());
    }

    #[test]
    fn test_contains_key_ignores_expiry() {
        let now = Instant::now();
        let mut lru = engine(4);

        lru.put("a", 1, Duration::ZERO, now);
        assert!(lru.contains_key(&"a"));
        assert_eq!(lru.len(), 1);
    }

    #[test]
    fn test_remove() {
        let now = Instant::now();
        let mut lru = engine(4);

        lru.put("a", 1, LONG, now);
        lru.put("b", 2, LONG, now);
        lru.put("c", 3, LONG, now);

        assert_eq!(lru.remove(&"b"), Some(2));
        assert_eq!(lru.remove(&"b"), None);
        assert_eq!(lru.keys_mru(), vec!["c", "a"]);
        assert!(lru.check_invariants().is_ok());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let now = Instant::now();
        let mut lru = engine(4);

        lru.put("a", 1, LONG, now);
        lru.put("b", 2, LONG, now);
        lru.clear();
        assert_eq!(lru.len(), 0);
        assert!(lru.lookup_table().is_empty());
        assert!(lru.check_invariants().is_ok());

        lru.clear();
        assert_eq!(lru.len(), 0);
        assert!(lru.check_invariants().is_ok());

        lru.put("c", 3, LONG, now);
        assert_eq!(lru.get(&"c", now), Ok(3));
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let now = Instant::now();
        let mut lru = engine(0);

        lru.put("a", 1, LONG, now);
        assert_eq!(lru.len(), 0);
        assert_eq!(lru.get(&"a", now), Err(CacheError::absent()));
    }

    #[test]
    fn test_sweep_in_batches() {
        let now = Instant::now();
        let mut lru: LruEngine<u32, u32> = LruEngine::new(16);
        for key in 0..10 {
            let ttl = if key < 6 { Duration::from_secs(1) } else { LONG };
            lru.put(key, key, ttl, now);
        }

        let later = now + Duration::from_secs(2);
        let mut cursor = 0;
        let mut removed = 0;
        let mut batches = 0;
        loop {
            let progress = lru.sweep_expired(cursor, 4, later);
            removed += progress.removed;
            batches += 1;
            match progress.next_cursor {
                Some(next) => cursor = next,
                None => break,
            }
        }

        assert_eq!(removed, 6);
        assert_eq!(batches, 3);
        assert_eq!(lru.len(), 4);
        assert!(lru.check_invariants().is_ok());
    }

    #[test]
    fn test_sweep_matches_lazy_expiry() {
        let now = Instant::now();
        let mut swept = engine(4);
        let mut lazy = engine(4);
        for lru in [&mut swept, &mut lazy] {
            lru.put("a", 1, Duration::from_secs(1), now);
            lru.put("b", 2, LONG, now);
        }

        let later = now + Duration::from_secs(1);
        assert_eq!(swept.purge_expired(later), 1);
        assert_eq!(lazy.get(&"a", later), Err(CacheError::expired()));

        assert_eq!(swept.keys_mru(), lazy.keys_mru());
        assert_eq!(swept.len(), lazy.len());
        // Sweeping again is a no-op
        assert_eq!(swept.purge_expired(later), 0);
    }

    #[test]
    fn test_slots_are_recycled() {
        let now = Instant::now();
        let mut lru: LruEngine<u32, u32> = LruEngine::new(3);
        for key in 0..100 {
            lru.put(key, key, LONG, now);
        }

        assert_eq!(lru.len(), 3);
        assert_eq!(lru.nodes.slot_count(), SENTINELS + 3);
        assert_eq!(lru.keys_mru(), vec![99, 98, 97]);
        assert!(lru.check_invariants().is_ok());
    }

    #[test]
    fn test_keys_mru_without_send_bounds() {
        use std::rc::Rc;

        let mut lru: LruEngine<Rc<str>, u32> = LruEngine::new(4);
        assert!(lru.keys_mru().is_empty());

        // Ordering helpers only need the inherent bounds
        let a: Rc<str> = Rc::from("a");
        let id = lru.nodes.insert(LruNode {
            entry: Some(Entry::new(Rc::clone(&a), 1, LONG, Instant::now())),
            prev: HEAD,
            next: TAIL,
        });
        lru.attach_front(id);
        lru.table.insert(Rc::clone(&a), id);
        assert_eq!(lru.keys_mru(), vec![a]);
    }

    #[test]
    fn test_debug_reports_entries_not_sentinels() {
        let mut lru = engine(4);
        assert!(format!("{:?}", lru).contains("len: 0"));

        lru.put("a", 1, LONG, Instant::now());
        let debug = format!("{:?}", lru);
        assert!(debug.starts_with("LruEngine"));
        assert!(debug.contains("len: 1"));
        assert!(debug.contains("capacity: 4"));
    }
}
