//! Admission request and decision types.

use serde::Serialize;

use crate::admission::Identity;
use crate::tenant::OperationClass;

/// One request presented to the gate.
#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    pub tenant_id: String,
    pub operation: OperationClass,
    /// Network source (client address), used by the burst guard
    pub source: String,
    /// Externally verified identity, if the caller is signed in
    pub identity: Option<Identity>,
}

impl AdmissionRequest {
    pub fn anonymous(
        tenant_id: impl Into<String>,
        operation: OperationClass,
        source: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            operation,
            source: source.into(),
            identity: None,
        }
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// Sliding window is full
    RateLimited,
    /// Source is under a burst block
    Blocked,
}

/// Outcome of `AdmissionGate::check`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdmissionDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// When the window frees a slot (Unix milliseconds)
    pub reset_time: u64,
    /// Zero when allowed
    pub retry_after_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
    /// True when the counter backend failed and the request was let through
    pub fail_open: bool,
}

impl AdmissionDecision {
    /// `X-RateLimit-*` and `Retry-After` header values.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("x-ratelimit-limit", self.limit.to_string()),
            ("x-ratelimit-remaining", self.remaining.to_string()),
            ("x-ratelimit-reset", (self.reset_time / 1000).to_string()),
        ];
        if !self.allowed {
            headers.push(("retry-after", self.retry_after_seconds.to_string()));
        }
        headers
    }

    pub fn error_message(&self) -> &'static str {
        match self.reason {
            Some(DenyReason::Blocked) => "Too many requests from this source; temporarily blocked",
            Some(DenyReason::RateLimited) | None => "Rate limit exceeded",
        }
    }
}
