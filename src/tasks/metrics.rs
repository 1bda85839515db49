//! Metrics flush: periodic snapshot of component stats to the log and
//! the telemetry sink.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::admission::AdmissionGate;
use crate::cache::CacheCluster;
use crate::pipeline::ContentProcessingPipeline;
use crate::telemetry::Telemetry;

/// What the flush reads from.
#[derive(Clone)]
pub struct MetricsSources {
    pub clusters: Vec<Arc<CacheCluster>>,
    pub gate: Arc<AdmissionGate>,
    pub pipeline: ContentProcessingPipeline,
}

/// Logs one snapshot and forwards the headline numbers as telemetry.
pub async fn flush_metrics(sources: &MetricsSources, telemetry: &Telemetry) {
    for cluster in &sources.clusters {
        let metrics = cluster.get_metrics().await;
        info!(
            cluster = cluster.name(),
            total_requests = metrics.total_requests,
            hit_rate = metrics.hit_rate,
            error_rate = metrics.error_rate,
            avg_response_time_ms = metrics.avg_response_time_ms,
            "Cache metrics"
        );
        telemetry.counter(
            "cache.requests",
            metrics.total_requests,
            vec![("cluster", cluster.name().to_string())],
        );
    }

    let gate = sources.gate.stats();
    info!(
        allowed = gate.allowed,
        denied = gate.denied,
        blocked = gate.blocked,
        fail_open = gate.fail_open,
        "Admission metrics"
    );
    telemetry.counter("gate.denied", gate.denied, Vec::new());

    let pipeline = sources.pipeline.get_stats().await;
    info!(
        total = pipeline.total_requests,
        processed = pipeline.processed_requests,
        failed = pipeline.failed_requests,
        active = pipeline.active,
        queued = pipeline.queued,
        cache_efficiency = pipeline.cache_efficiency,
        "Pipeline metrics"
    );
    telemetry.counter("pipeline.processed", pipeline.processed_requests, Vec::new());

    if telemetry.dropped() > 0 {
        info!(dropped = telemetry.dropped(), "Telemetry events dropped");
    }
}

pub fn spawn_metrics_task(
    sources: MetricsSources,
    telemetry: Telemetry,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            flush_metrics(&sources, &telemetry).await;
        }
    })
}
