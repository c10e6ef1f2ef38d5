//! Background Tasks Module
//!
//! Contains background tasks that run periodically for the lifetime of a
//! cache instance.
//!
//! # Tasks
//! - TTL Sweeper: Removes expired entries at the configured interval

mod sweeper;

pub(crate) use sweeper::{spawn_sweeper, SweeperHandle};
