//! Background Tasks Module
//!
//! Periodic loops that run alongside the server. Each awaits its body
//! before the next tick and skips missed ticks, so no loop overlaps itself.
//!
//! # Tasks
//! - TTL cleanup: sweeps expired cache entries
//! - Scheduler: dispatches queued pipeline requests
//! - Health: probes cache nodes, re-evaluates validation queue health
//! - Metrics flush: logs component stats and forwards them as telemetry

mod cleanup;
mod health;
mod metrics;
mod scheduler;

pub use cleanup::spawn_cleanup_task;
pub use health::spawn_health_task;
pub use metrics::{flush_metrics, spawn_metrics_task, MetricsSources};
pub use scheduler::spawn_scheduler_task;
