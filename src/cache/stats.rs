//! Cache Metrics Module
//!
//! Cluster-wide operation metrics. Counters are atomics so every operation
//! can record without taking a lock.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

// == Cache Metrics ==
/// Live counters updated on every cluster operation.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    total_requests: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    total_latency_us: AtomicU64,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one operation and its latency.
    pub fn record_request(&self, elapsed: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time view combined with the latest node health.
    pub fn snapshot(&self, node_health: BTreeMap<String, bool>) -> MetricsSnapshot {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let errors = self.errors.load(Ordering::Relaxed);
        let latency_us = self.total_latency_us.load(Ordering::Relaxed);

        let lookups = hits + misses;
        MetricsSnapshot {
            total_requests,
            hits,
            misses,
            errors,
            hit_rate: ratio(hits, lookups),
            miss_rate: ratio(misses, lookups),
            error_rate: ratio(errors, total_requests),
            avg_response_time_ms: if total_requests == 0 {
                0.0
            } else {
                latency_us as f64 / total_requests as f64 / 1000.0
            },
            node_health,
        }
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

// == Metrics Snapshot ==
/// Serializable cache metrics as reported by `get_metrics`.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    /// hits / (hits + misses)
    pub hit_rate: f64,
    /// misses / (hits + misses)
    pub miss_rate: f64,
    /// errors / total_requests
    pub error_rate: f64,
    pub avg_response_time_ms: f64,
    /// Node name -> healthy, as of the last health check
    pub node_health: BTreeMap<String, bool>,
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_empty() {
        let metrics = CacheMetrics::new();
        let snapshot = metrics.snapshot(BTreeMap::new());
        assert_eq!(snapshot.total_requests, 0);
        assert_eq!(snapshot.hit_rate, 0.0);
        assert_eq!(snapshot.error_rate, 0.0);
        assert_eq!(snapshot.avg_response_time_ms, 0.0);
    }

    #[test]
    fn test_hit_and_miss_rates() {
        let metrics = CacheMetrics::new();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_miss();

        let snapshot = metrics.snapshot(BTreeMap::new());
        assert_eq!(snapshot.hit_rate, 0.75);
        assert_eq!(snapshot.miss_rate, 0.25);
    }

    #[test]
    fn test_error_rate_and_latency() {
        let metrics = CacheMetrics::new();
        metrics.record_request(Duration::from_millis(2));
        metrics.record_request(Duration::from_millis(4));
        metrics.record_error();

        let snapshot = metrics.snapshot(BTreeMap::from([("node-0".to_string(), true)]));
        assert_eq!(snapshot.error_rate, 0.5);
        assert!((snapshot.avg_response_time_ms - 3.0).abs() < 0.001);
        assert_eq!(snapshot.node_health.get("node-0"), Some(&true));
    }
}
