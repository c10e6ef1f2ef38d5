//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use std::fmt;

use thiserror::Error;

// == Miss Reason ==
/// Why a lookup did not produce a value.
///
/// Both reasons surface as [`CacheError::NotFound`], but they are kept
/// distinct so logs and callers can tell an absent key from an expired one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MissReason {
    /// Key never existed or was already removed
    Absent,
    /// Key existed but its TTL had elapsed at lookup time
    Expired,
}

impl MissReason {
    /// Returns the lowercase label used in log output.
    pub fn as_str(&self) -> &'static str {
        match self {
            MissReason::Absent => "absent",
            MissReason::Expired => "expired",
        }
    }
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Cache Error Enum ==
/// Unified error type for the cache.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Key could not be returned by `get`
    #[error("Key not found ({reason})")]
    NotFound { reason: MissReason },

    /// Operation attempted after the cache was closed
    #[error("Cache is closed")]
    Closed,

    /// Unsupported policy, zero capacity or otherwise unusable settings
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The background sweeper needs a Tokio runtime to be spawned on
    #[error("No Tokio runtime available to run the sweeper")]
    NoRuntime,
}

impl CacheError {
    /// Shorthand for `NotFound { reason: Absent }`.
    pub fn absent() -> Self {
        CacheError::NotFound {
            reason: MissReason::Absent,
        }
    }

    /// Shorthand for `NotFound { reason: Expired }`.
    pub fn expired() -> Self {
        CacheError::NotFound {
            reason: MissReason::Expired,
        }
    }

    /// Returns the miss reason if this is a `NotFound` error.
    pub fn miss_reason(&self) -> Option<MissReason> {
        match self {
            CacheError::NotFound { reason } => Some(*reason),
            _ => None,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
