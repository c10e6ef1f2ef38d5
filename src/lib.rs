//! Mini Cache - A generic in-process key-value cache
//!
//! Provides LRU and LFU eviction with per-entry TTL expiration, a
//! single-writer concurrency discipline and a background TTL sweeper.

pub mod cache;
pub mod config;
pub mod error;
mod tasks;

pub use cache::{Cache, CacheBuilder, PolicyKind, TimeUnit};
pub use config::CacheConfig;
pub use error::{CacheError, MissReason, Result};
