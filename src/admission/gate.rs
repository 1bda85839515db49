//! Admission gate: sliding-window rate limiting plus a burst guard.
//!
//! Counters live in a dedicated cache cluster owned by the gate. If that
//! backend fails, the gate lets the request through and reports the
//! failure; availability wins over strict enforcement.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::admission::{AdmissionDecision, AdmissionRequest, DenyReason, Role};
use crate::cache::{current_timestamp_ms, CacheCluster, SetOptions, TenantCache, WindowHit};
use crate::error::{AdmissionError, CacheError};
use crate::telemetry::Telemetry;
use crate::tenant::{TenantProfile, TenantProfileRegistry};

// == Config ==
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Fixed window over which burst events are counted
    pub burst_window: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            burst_window: Duration::from_secs(60),
        }
    }
}

// == Gate Stats ==
#[derive(Debug, Default)]
struct GateCounters {
    allowed: AtomicU64,
    denied: AtomicU64,
    blocked: AtomicU64,
    fail_open: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GateStats {
    pub allowed: u64,
    pub denied: u64,
    pub blocked: u64,
    pub fail_open: u64,
}

// == Admission Gate ==
pub struct AdmissionGate {
    store: Arc<CacheCluster>,
    tenants: Arc<TenantProfileRegistry>,
    config: AdmissionConfig,
    telemetry: Telemetry,
    counters: GateCounters,
}

impl AdmissionGate {
    pub fn new(
        store: Arc<CacheCluster>,
        tenants: Arc<TenantProfileRegistry>,
        config: AdmissionConfig,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            store,
            tenants,
            config,
            telemetry,
            counters: GateCounters::default(),
        }
    }

    /// Decides whether a request proceeds.
    ///
    /// Only an unknown or mismatched tenant is an error; every rate or
    /// burst outcome is a decision.
    pub async fn check(
        &self,
        request: &AdmissionRequest,
    ) -> Result<AdmissionDecision, AdmissionError> {
        let profile = self.tenants.resolve(&request.tenant_id).await?;
        if let Some(identity) = &request.identity {
            if identity.tenant_id != request.tenant_id {
                return Err(AdmissionError::InvalidTenant(identity.tenant_id.clone()));
            }
        }

        let cache = TenantCache::new(self.store.clone(), &profile.tenant_id);
        let rule = profile.limit_for(request.operation);
        let role = request
            .identity
            .as_ref()
            .map(|identity| identity.privilege())
            .unwrap_or(Role::Anonymous);
        let limit = role.scale(rule.max_requests);
        let now = current_timestamp_ms();

        match self.burst_guard(&cache, &profile, &request.source).await {
            Ok(Some(retry_after_seconds)) => {
                self.counters.blocked.fetch_add(1, Ordering::Relaxed);
                self.telemetry.counter(
                    "gate.blocked",
                    1,
                    vec![("tenant", profile.tenant_id.to_string())],
                );
                return Ok(AdmissionDecision {
                    allowed: false,
                    limit,
                    remaining: 0,
                    reset_time: now + retry_after_seconds * 1000,
                    retry_after_seconds,
                    reason: Some(DenyReason::Blocked),
                    fail_open: false,
                });
            }
            Ok(None) => {}
            // The rate window below still applies.
            Err(err) => self.report_backend_error("burst", &profile, &err),
        }

        let subject = request
            .identity
            .as_ref()
            .map(|identity| identity.user_id.as_str())
            .unwrap_or(request.source.as_str());
        let window_key = format!(
            "gate:rate:{}:{}:{}",
            request.operation.as_str(),
            role,
            subject
        );
        let window = Duration::from_millis(rule.window_ms);
        let hit = WindowHit {
            now_ms: now,
            window,
            limit,
            member: Uuid::new_v4().to_string(),
        };

        let state = match cache.window_hit(&window_key, hit).await {
            Ok(state) => state,
            Err(err) => {
                self.report_backend_error("window", &profile, &err);
                self.counters.fail_open.fetch_add(1, Ordering::Relaxed);
                self.counters.allowed.fetch_add(1, Ordering::Relaxed);
                return Ok(AdmissionDecision {
                    allowed: true,
                    limit,
                    remaining: limit,
                    reset_time: now + rule.window_ms,
                    retry_after_seconds: 0,
                    reason: None,
                    fail_open: true,
                });
            }
        };

        let reset_time = state.oldest_ms.unwrap_or(now) + rule.window_ms;
        if state.admitted {
            self.counters.allowed.fetch_add(1, Ordering::Relaxed);
            Ok(AdmissionDecision {
                allowed: true,
                limit,
                remaining: limit.saturating_sub(state.count),
                reset_time,
                retry_after_seconds: 0,
                reason: None,
                fail_open: false,
            })
        } else {
            self.counters.denied.fetch_add(1, Ordering::Relaxed);
            let wait_ms = reset_time.saturating_sub(now);
            debug!(
                tenant = %profile.tenant_id,
                operation = request.operation.as_str(),
                subject,
                count = state.count,
                limit,
                "Rate limit exceeded"
            );
            Ok(AdmissionDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_time,
                retry_after_seconds: wait_ms.div_ceil(1000).max(1),
                reason: Some(DenyReason::RateLimited),
                fail_open: false,
            })
        }
    }

    /// Counts the event against the source's burst window. Returns the
    /// remaining block in seconds when the source is blocked.
    async fn burst_guard(
        &self,
        cache: &TenantCache,
        profile: &TenantProfile,
        source: &str,
    ) -> Result<Option<u64>, CacheError> {
        let block_key = format!("gate:block:{}", source);
        if cache.exists(&block_key).await? {
            let ttl = cache.ttl(&block_key).await?;
            return Ok(Some(ttl.max(1) as u64));
        }

        let ddos = profile.ddos_policy();
        let burst_key = format!("gate:burst:{}", source);
        let count = cache.incr(&burst_key, 1).await?;
        if count == 1 {
            cache.expire(&burst_key, self.config.burst_window).await?;
        }

        if count.max(0) as u64 >= ddos.suspicious_threshold {
            let block = Duration::from_millis(ddos.block_duration_ms.max(1));
            if !cache
                .set(&block_key, "1".to_string(), SetOptions::ttl(block))
                .await
            {
                return Err(CacheError::BackendUnavailable(
                    "could not write block marker".to_string(),
                ));
            }
            cache.del(&burst_key).await;
            warn!(
                tenant = %profile.tenant_id,
                source,
                count,
                block_ms = ddos.block_duration_ms,
                "Burst threshold reached; blocking source"
            );
            self.telemetry.counter(
                "gate.block_written",
                1,
                vec![("tenant", profile.tenant_id.to_string())],
            );
        }
        Ok(None)
    }

    fn report_backend_error(&self, stage: &'static str, profile: &TenantProfile, err: &CacheError) {
        warn!(
            tenant = %profile.tenant_id,
            stage,
            error = %err,
            "Admission backend unavailable; failing open"
        );
        self.telemetry
            .error("gate.backend_unavailable", format!("{}: {}", stage, err));
    }

    pub fn stats(&self) -> GateStats {
        GateStats {
            allowed: self.counters.allowed.load(Ordering::Relaxed),
            denied: self.counters.denied.load(Ordering::Relaxed),
            blocked: self.counters.blocked.load(Ordering::Relaxed),
            fail_open: self.counters.fail_open.load(Ordering::Relaxed),
        }
    }
}
