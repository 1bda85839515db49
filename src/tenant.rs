//! Tenant Profiles
//!
//! Per-tenant rate, burst and package-size policy. Profiles are supplied
//! from outside (a JSON file or an inline list) and are read-only to the
//! rest of the crate.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::error::AdmissionError;

// == Tenant Id ==
/// Validated tenant identifier: 2-64 chars of `[a-z0-9-]`, not starting or
/// ending with `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    pub fn parse(raw: &str) -> Result<Self, AdmissionError> {
        let valid_len = (2..=64).contains(&raw.len());
        let valid_chars = raw
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
        let valid_edges = !raw.starts_with('-') && !raw.ends_with('-');

        if valid_len && valid_chars && valid_edges {
            Ok(Self(raw.to_string()))
        } else {
            Err(AdmissionError::InvalidTenant(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TenantId {
    type Error = AdmissionError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<TenantId> for String {
    fn from(id: TenantId) -> Self {
        id.0
    }
}

// == Operation Class ==
/// Request classes that carry independent rate budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
    Api,
    ContentSubmission,
    CacheAdmin,
}

impl OperationClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationClass::Api => "api",
            OperationClass::ContentSubmission => "content_submission",
            OperationClass::CacheAdmin => "cache_admin",
        }
    }
}

// == Policies ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub window_ms: u64,
    pub max_requests: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DdosPolicy {
    /// Events per 60s from one source that trigger a block
    pub suspicious_threshold: u64,
    pub block_duration_ms: u64,
}

// == Tenant Tier ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantTier {
    Free,
    Standard,
    Premium,
    Enterprise,
}

const MIB: u64 = 1024 * 1024;

impl TenantTier {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "free" => Some(TenantTier::Free),
            "standard" => Some(TenantTier::Standard),
            "premium" => Some(TenantTier::Premium),
            "enterprise" => Some(TenantTier::Enterprise),
            _ => None,
        }
    }

    pub fn default_limit(&self, operation: OperationClass) -> RateLimitRule {
        let (api, content, admin) = match self {
            TenantTier::Free => (100, 10, 5),
            TenantTier::Standard => (600, 60, 20),
            TenantTier::Premium => (2_000, 200, 60),
            TenantTier::Enterprise => (10_000, 1_000, 200),
        };
        let max_requests = match operation {
            OperationClass::Api => api,
            OperationClass::ContentSubmission => content,
            OperationClass::CacheAdmin => admin,
        };
        RateLimitRule {
            window_ms: 60_000,
            max_requests,
        }
    }

    pub fn default_ddos(&self) -> DdosPolicy {
        let (suspicious_threshold, block_secs) = match self {
            TenantTier::Free => (300, 300),
            TenantTier::Standard => (1_000, 300),
            TenantTier::Premium => (3_000, 120),
            TenantTier::Enterprise => (10_000, 60),
        };
        DdosPolicy {
            suspicious_threshold,
            block_duration_ms: block_secs * 1000,
        }
    }

    pub fn max_package_bytes(&self) -> u64 {
        match self {
            TenantTier::Free => 5 * MIB,
            TenantTier::Standard => 25 * MIB,
            TenantTier::Premium => 100 * MIB,
            TenantTier::Enterprise => 500 * MIB,
        }
    }
}

// == Tenant Profile ==
/// Policy for one tenant. Anything not overridden falls back to the tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantProfile {
    pub tenant_id: TenantId,
    pub tier: TenantTier,
    #[serde(default)]
    pub limits: HashMap<OperationClass, RateLimitRule>,
    #[serde(default)]
    pub ddos: Option<DdosPolicy>,
    #[serde(default)]
    pub max_package_bytes: Option<u64>,
}

impl TenantProfile {
    pub fn for_tier(tenant_id: TenantId, tier: TenantTier) -> Self {
        Self {
            tenant_id,
            tier,
            limits: HashMap::new(),
            ddos: None,
            max_package_bytes: None,
        }
    }

    pub fn with_limit(mut self, operation: OperationClass, rule: RateLimitRule) -> Self {
        self.limits.insert(operation, rule);
        self
    }

    pub fn with_ddos(mut self, ddos: DdosPolicy) -> Self {
        self.ddos = Some(ddos);
        self
    }

    pub fn with_max_package_bytes(mut self, bytes: u64) -> Self {
        self.max_package_bytes = Some(bytes);
        self
    }

    pub fn limit_for(&self, operation: OperationClass) -> RateLimitRule {
        self.limits
            .get(&operation)
            .copied()
            .unwrap_or_else(|| self.tier.default_limit(operation))
    }

    pub fn ddos_policy(&self) -> DdosPolicy {
        self.ddos.unwrap_or_else(|| self.tier.default_ddos())
    }

    pub fn package_limit(&self) -> u64 {
        self.max_package_bytes
            .unwrap_or_else(|| self.tier.max_package_bytes())
    }
}

// == Registry ==
/// Read-mostly lookup of tenant profiles.
#[derive(Debug, Default)]
pub struct TenantProfileRegistry {
    profiles: RwLock<HashMap<TenantId, Arc<TenantProfile>>>,
}

impl TenantProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profiles(profiles: impl IntoIterator<Item = TenantProfile>) -> Self {
        let profiles = profiles
            .into_iter()
            .map(|p| (p.tenant_id.clone(), Arc::new(p)))
            .collect();
        Self {
            profiles: RwLock::new(profiles),
        }
    }

    pub async fn register(&self, profile: TenantProfile) {
        info!(tenant = %profile.tenant_id, tier = ?profile.tier, "Registered tenant profile");
        self.profiles
            .write()
            .await
            .insert(profile.tenant_id.clone(), Arc::new(profile));
    }

    /// Looks up a tenant; malformed or unknown ids are `InvalidTenant`.
    pub async fn resolve(&self, raw_id: &str) -> Result<Arc<TenantProfile>, AdmissionError> {
        let id = TenantId::parse(raw_id)?;
        self.profiles
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AdmissionError::InvalidTenant(raw_id.to_string()))
    }

    pub async fn len(&self) -> usize {
        self.profiles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.profiles.read().await.is_empty()
    }

    /// Parses a JSON array of profiles.
    pub fn parse_json(json: &str) -> serde_json::Result<Vec<TenantProfile>> {
        serde_json::from_str(json)
    }

    /// Reads a JSON array of profiles from disk.
    pub fn load_file(path: impl AsRef<Path>) -> anyhow::Result<Vec<TenantProfile>> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {}", path.display(), e))?;
        Ok(Self::parse_json(&raw)?)
    }

    /// Parses `id:tier,id:tier`; entries that do not parse are skipped.
    pub fn parse_inline(list: &str) -> Vec<TenantProfile> {
        list.split(',')
            .filter_map(|item| {
                let (id, tier) = item.trim().split_once(':')?;
                let id = TenantId::parse(id.trim()).ok()?;
                let tier = TenantTier::parse(tier)?;
                Some(TenantProfile::for_tier(id, tier))
            })
            .collect()
    }
}
