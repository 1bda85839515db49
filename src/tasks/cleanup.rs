//! TTL Cleanup Task
//!
//! Background task that periodically sweeps expired entries from every
//! cache cluster. Reads already skip expired entries; the sweep reclaims
//! their memory.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::cache::CacheCluster;

/// Spawns the cleanup loop. Abort the handle to stop it.
///
/// # Example
/// ```ignore
/// let handle = spawn_cleanup_task(vec![results.clone(), limiter.clone()], Duration::from_secs(1));
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_cleanup_task(clusters: Vec<Arc<CacheCluster>>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_ms = every.as_millis() as u64, "Starting TTL cleanup task");

        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            ticker.tick().await;

            for cluster in &clusters {
                let removed = cluster.cleanup_expired().await;
                if removed > 0 {
                    info!(cluster = cluster.name(), removed, "TTL cleanup removed expired entries");
                } else {
                    debug!(cluster = cluster.name(), "TTL cleanup: no expired entries found");
                }
            }
        }
    })
}
