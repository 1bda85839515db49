//! Response DTOs for the HTTP API
//!
//! Defines the structure of outgoing HTTP response bodies.

use std::collections::HashMap;

use serde::Serialize;

use crate::admission::{AdmissionDecision, GateStats};
use crate::cache::{ClusterHealth, MetricsSnapshot};
use crate::pipeline::{PipelineStats, ProcessingResult};
use crate::validation::{HealthState, QueueHealth, ValidationResponse};

/// Response body for POST /v1/content
#[derive(Debug, Clone, Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub id: String,
}

impl SubmitResponse {
    pub fn accepted(id: impl Into<String>) -> Self {
        Self {
            success: true,
            id: id.into(),
        }
    }
}

/// Response body for POST /v1/content/batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchResponse {
    pub success: bool,
    pub total: usize,
    pub succeeded: usize,
    pub results: HashMap<String, ProcessingResult>,
}

impl BatchResponse {
    pub fn new(results: HashMap<String, ProcessingResult>) -> Self {
        Self {
            success: true,
            total: results.len(),
            succeeded: results.values().filter(|r| r.success).count(),
            results,
        }
    }
}

/// Response body for GET /v1/content/:id
#[derive(Debug, Clone, Serialize)]
pub struct ContentResultResponse {
    pub success: bool,
    pub result: ProcessingResult,
}

/// Response body for GET /v1/validation/:id
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResultResponse {
    pub success: bool,
    pub validation: ValidationResponse,
}

/// Response body for POST /v1/cache/invalidate
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    pub success: bool,
    pub cleared: usize,
}

/// Body of a 429 response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitedResponse {
    pub success: bool,
    pub error: String,
    /// Seconds until a retry can succeed
    pub retry_after: u64,
    /// Unix milliseconds when the window frees a slot
    pub reset_time: u64,
}

impl RateLimitedResponse {
    pub fn from_decision(decision: &AdmissionDecision) -> Self {
        Self {
            success: false,
            error: decision.error_message().to_string(),
            retry_after: decision.retry_after_seconds,
            reset_time: decision.reset_time,
        }
    }
}

/// Response body for GET /stats
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub cache: MetricsSnapshot,
    pub limiter: MetricsSnapshot,
    pub admission: GateStats,
    pub validation: QueueHealth,
    pub pipeline: PipelineStats,
}

/// Response body for GET /health
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "healthy" or "degraded"
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
    pub cache: ClusterHealth,
    pub limiter: ClusterHealth,
    pub validation: HealthState,
}

impl HealthResponse {
    pub fn new(cache: ClusterHealth, limiter: ClusterHealth, validation: HealthState) -> Self {
        let healthy = cache.healthy && limiter.healthy && validation == HealthState::Healthy;
        Self {
            status: if healthy { "healthy" } else { "degraded" }.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            cache,
            limiter,
            validation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::DenyReason;

    #[test]
    fn test_rate_limited_body_uses_camel_case() {
        let decision = AdmissionDecision {
            allowed: false,
            limit: 10,
            remaining: 0,
            reset_time: 1_700_000_000_000,
            retry_after_seconds: 7,
            reason: Some(DenyReason::RateLimited),
            fail_open: false,
        };
        let json = serde_json::to_value(RateLimitedResponse::from_decision(&decision)).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["retryAfter"], 7);
        assert_eq!(json["resetTime"], 1_700_000_000_000u64);
        assert_eq!(json["error"], "Rate limit exceeded");
    }

    #[test]
    fn test_health_response_degraded_when_node_down() {
        let up = ClusterHealth {
            healthy: true,
            nodes: Vec::new(),
        };
        let down = ClusterHealth {
            healthy: false,
            nodes: Vec::new(),
        };
        assert_eq!(HealthResponse::new(up.clone(), up.clone(), HealthState::Healthy).status, "healthy");
        assert_eq!(HealthResponse::new(up, down, HealthState::Healthy).status, "degraded");
    }

    #[test]
    fn test_batch_response_counts() {
        let response = BatchResponse::new(HashMap::new());
        assert_eq!(response.total, 0);
        assert!(response.success);
    }
}
