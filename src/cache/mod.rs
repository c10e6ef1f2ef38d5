//! Cache Module
//!
//! Provides in-memory caching with TTL expiration and LRU or LFU eviction.

mod builder;
mod entry;
mod lfu;
mod lru;
mod policy;
mod slab;
pub(crate) mod store;


// Re-export public types
pub use builder::CacheBuilder;
pub use entry::{Entry, TimeUnit};
pub use lfu::LfuEngine;
pub use lru::LruEngine;
pub use policy::{new_policy, EvictionPolicy, LookupTable, PolicyKind, SweepProgress};
pub use slab::SlotId;
pub use store::Cache;

// == Public Constants ==
/// Capacity used when none is configured
pub const DEFAULT_CAPACITY: usize = 1000;

/// Seconds between background sweeps
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 1;

/// Slots visited per sweep batch before the lock is released
pub const DEFAULT_SWEEP_BATCH: usize = 256;
