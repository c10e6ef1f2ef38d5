//! Cache Entry Module
//!
//! Defines the stored unit of state and the TTL model shared by every
//! eviction policy.

use std::time::Duration;

use tokio::time::Instant;

// == Cache Entry ==
/// Represents a single cache entry with value and expiry metadata.
///
/// `created_at` is fixed when the entry is first inserted. Updating the value
/// through `put` keeps the original creation time, so the first write's TTL
/// keeps governing expiry.
#[derive(Debug, Clone)]
pub struct Entry<K, V> {
    /// The key this entry is stored under
    pub key: K,
    /// The stored value
    pub value: V,
    /// Creation instant
    pub created_at: Instant,
    /// Time-to-live measured from `created_at`
    pub ttl: Duration,
}

impl<K, V> Entry<K, V> {
    // == Constructor ==
    /// Creates a new entry created at `now`.
    pub fn new(key: K, value: V, ttl: Duration, now: Instant) -> Self {
        Self {
            key,
            value,
            created_at: now,
            ttl,
        }
    }

    // == Expires At ==
    /// Returns the expiry instant, or `None` if `created_at + ttl` does not
    /// fit in the clock (treated as never expiring).
    pub fn expires_at(&self) -> Option<Instant> {
        self.created_at.checked_add(self.ttl)
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// Boundary condition: an entry is expired once `now >= expires_at`, so a
    /// zero TTL expires on the very next access.
    pub fn is_expired(&self, now: Instant) -> bool {
        match self.expires_at() {
            Some(expires) => now >= expires,
            None => false,
        }
    }
}

// == Time Unit ==
/// Unit for the `(amount, unit)` form of a TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Converts `amount` of this unit into a `Duration`.
    ///
    /// Zero or negative amounts yield `Duration::ZERO`; overly large amounts
    /// saturate at `Duration::MAX`.
    pub fn to_duration(self, amount: i64) -> Duration {
        if amount <= 0 {
            return Duration::ZERO;
        }
        let amount = amount as u64;
        match self {
            TimeUnit::Nanoseconds => Duration::from_nanos(amount),
            TimeUnit::Microseconds => Duration::from_micros(amount),
            TimeUnit::Milliseconds => Duration::from_millis(amount),
            TimeUnit::Seconds => Duration::from_secs(amount),
            TimeUnit::Minutes => secs_saturating(amount, 60),
            TimeUnit::Hours => secs_saturating(amount, 60 * 60),
            TimeUnit::Days => secs_saturating(amount, 24 * 60 * 60),
        }
    }
}

fn secs_saturating(amount: u64, factor: u64) -> Duration {
    amount
        .checked_mul(factor)
        .map(Duration::from_secs)
        .unwrap_or(Duration::MAX)
}
