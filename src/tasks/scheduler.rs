//! Pipeline scheduler tick.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::pipeline::ContentProcessingPipeline;

/// Drives `ContentProcessingPipeline::tick` at a fixed interval. Each tick
/// is awaited before the next, so ticks never overlap.
pub fn spawn_scheduler_task(pipeline: ContentProcessingPipeline, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_ms = every.as_millis() as u64, "Starting pipeline scheduler");

        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let dispatched = pipeline.tick().await;
            if dispatched > 0 {
                debug!(dispatched, "Scheduler dispatched queued requests");
            }
        }
    })
}
