//! TTL Sweeper Task
//!
//! Background task that periodically removes expired cache entries, so TTLs
//! are enforced even for keys that are never read again.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cache::store::Shared;
use crate::error::{CacheError, Result};

// == Sweeper Handle ==
/// Owns a running sweeper task.
#[derive(Debug)]
pub(crate) struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signals the task to stop and waits until it has exited.
    pub(crate) async fn stop(self) {
        let _ = self.shutdown.send(true);
        match self.join.await {
            Ok(()) => debug!("TTL sweeper stopped"),
            Err(err) if err.is_cancelled() => debug!("TTL sweeper cancelled"),
            Err(err) => warn!("TTL sweeper exited abnormally: {}", err),
        }
    }

    /// Cancels the task without waiting for it.
    pub(crate) fn abort(&self) {
        self.join.abort();
    }

    #[cfg(test)]
    pub(crate) fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Spawns a task that sweeps expired entries every `interval`.
///
/// Each tick walks the engine's slots in batches of `batch` slots. The
/// single-writer lock is taken per batch and released in between, and the
/// task yields after each batch so foreground operations interleave with a
/// long scan.
///
/// Fails with `NoRuntime` when called outside a Tokio runtime.
pub(crate) fn spawn_sweeper<K, V>(
    shared: Arc<Shared<K, V>>,
    interval: Duration,
    batch: usize,
) -> Result<SweeperHandle>
where
    K: Send + Sync + 'static,
    V: Send + 'static,
{
    let runtime = Handle::try_current().map_err(|_| CacheError::NoRuntime)?;
    let (shutdown, mut shutdown_rx) = watch::channel(false);

    let join = runtime.spawn(async move {
        info!(
            "Starting TTL sweeper with interval of {}ms",
            interval.as_millis()
        );

        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // Fires on shutdown, or when the handle was dropped
                _ = shutdown_rx.changed() => break,
                _ = ticker.tick() => {}
            }

            let Some(removed) = sweep_once(&shared, batch).await else {
                break;
            };

            if removed > 0 {
                info!("TTL sweep: removed {} expired entries", removed);
            } else {
                debug!("TTL sweep: no expired entries found");
            }
        }
    });

    Ok(SweeperHandle { shutdown, join })
}

/// Runs one full pass over the engine. Returns `None` if the cache was
/// closed part way through.
async fn sweep_once<K, V>(shared: &Shared<K, V>, batch: usize) -> Option<usize> {
    let mut cursor = 0;
    let mut removed = 0;
    loop {
        let progress = shared.sweep_batch(cursor, batch).await?;
        removed += progress.removed;
        match progress.next_cursor {
            Some(next) => {
                cursor = next;
                tokio::task::yield_now().await;
            }
            None => return Some(removed),
        }
    }
}
