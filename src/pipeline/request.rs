//! Processing request and result model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::content::{ContentType, Priority};
use crate::pipeline::optimize::OptimizedAssets;
use crate::pipeline::package::DeploymentPackage;
use crate::tenant::TenantId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMetadata {
    #[serde(default)]
    pub priority: Priority,
    pub content_type: ContentType,
    pub tenant_id: TenantId,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Hotfix content is cached for the shortest class TTL
    #[serde(default)]
    pub hotfix: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingRequest {
    pub id: String,
    pub content: Value,
    pub metadata: RequestMetadata,
}

impl ProcessingRequest {
    pub fn new(tenant_id: TenantId, content_type: ContentType, content: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content,
            metadata: RequestMetadata {
                priority: Priority::default(),
                content_type,
                tenant_id,
                timestamp: Utc::now(),
                hotfix: false,
            },
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.metadata.priority = priority;
        self
    }

    pub fn hotfix(mut self) -> Self {
        self.metadata.hotfix = true;
        self
    }
}

/// Machine-readable reason a request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Content is structurally invalid
    Validation,
    /// Validation did not answer within its deadline
    Timeout,
    /// Validation queue was at capacity
    ValidationCapacity,
    /// Structural validator failed
    ValidatorUnavailable,
    PackageTooLarge,
    SlaExceeded,
    InvalidTenant,
    /// Another request with the same id is still running for the tenant
    DuplicateId,
    ShuttingDown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageMetrics {
    pub validation_time_ms: u64,
    pub optimization_time_ms: u64,
    pub deployment_time_ms: u64,
    pub total_time_ms: u64,
    pub cache_hits: u32,
    pub cache_misses: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated_content: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimized_assets: Option<OptimizedAssets>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_package: Option<DeploymentPackage>,
    pub metrics: StageMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

impl ProcessingResult {
    pub fn failed(
        id: impl Into<String>,
        kind: FailureKind,
        error: impl Into<String>,
        metrics: StageMetrics,
    ) -> Self {
        Self {
            id: id.into(),
            success: false,
            validated_content: None,
            optimized_assets: None,
            deployment_package: None,
            metrics,
            error: Some(error.into()),
            failure_kind: Some(kind),
            warnings: Vec::new(),
            completed_at: Utc::now(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}
