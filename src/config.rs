//! Configuration Module
//!
//! Loads server and component configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::admission::AdmissionConfig;
use crate::pipeline::PipelineConfig;
use crate::tenant::{TenantProfile, TenantProfileRegistry};
use crate::validation::{SanitizeLimits, ValidationConfig};

/// Cache cluster sizing. The limiter gets its own cluster so a result
/// cache outage does not also disable rate limiting.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub nodes: usize,
    pub max_entries_per_node: usize,
    /// TTL for keys no policy matches
    pub default_ttl: Duration,
    pub limiter_nodes: usize,
    pub limiter_max_entries_per_node: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            nodes: 2,
            max_entries_per_node: 10_000,
            default_ttl: Duration::from_secs(300),
            limiter_nodes: 1,
            limiter_max_entries_per_node: 100_000,
        }
    }
}

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    pub cache: CacheConfig,
    pub admission: AdmissionConfig,
    pub validation: ValidationConfig,
    pub pipeline: PipelineConfig,
    pub cleanup_interval: Duration,
    pub health_interval: Duration,
    pub metrics_interval: Duration,
    /// Capacity of the telemetry channel
    pub telemetry_buffer: usize,
    pub shutdown_grace: Duration,
    /// JSON file with an array of tenant profiles
    pub tenant_profiles_path: Option<String>,
    /// Inline `id:tier,id:tier` list
    pub tenants: Option<String>,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_ms(key: &str, default: Duration) -> Duration {
    Duration::from_millis(env_or(key, default.as_millis() as u64))
}

fn env_secs(key: &str, default: Duration) -> Duration {
    Duration::from_secs(env_or(key, default.as_secs()))
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CACHE_NODES`, `MAX_ENTRIES` - result cache nodes and per-node capacity (2, 10000)
    /// - `DEFAULT_TTL` - TTL in seconds for keys no policy matches (default: 300)
    /// - `LIMITER_NODES`, `LIMITER_MAX_ENTRIES` - counter cluster sizing (1, 100000)
    /// - `BURST_WINDOW_SECS` - burst guard window (default: 60)
    /// - `MAX_CONCURRENT_VALIDATIONS` (10), `VALIDATION_RESULT_TTL` secs (3600),
    ///   `MAX_STRING_LENGTH` (10000)
    /// - `MAX_CONCURRENT_PROCESSING` (5), `MAX_QUEUE_SIZE` (1000),
    ///   `VALIDATION_TIMEOUT_MS` (30000), `SLA_TARGET_MS` (60000), `BATCH_SIZE` (10),
    ///   `SCHEDULER_INTERVAL_MS` (100)
    /// - `CLEANUP_INTERVAL_MS` (1000), `HEALTH_INTERVAL_MS` (5000), `METRICS_INTERVAL_MS` (30000)
    /// - `TELEMETRY_BUFFER` (1024), `SHUTDOWN_GRACE_SECS` (30)
    /// - `TENANT_PROFILES_PATH`, `TENANTS` - tenant profile sources
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cache = CacheConfig {
            nodes: env_or("CACHE_NODES", defaults.cache.nodes),
            max_entries_per_node: env_or("MAX_ENTRIES", defaults.cache.max_entries_per_node),
            default_ttl: env_secs("DEFAULT_TTL", defaults.cache.default_ttl),
            limiter_nodes: env_or("LIMITER_NODES", defaults.cache.limiter_nodes),
            limiter_max_entries_per_node: env_or(
                "LIMITER_MAX_ENTRIES",
                defaults.cache.limiter_max_entries_per_node,
            ),
        };

        let admission = AdmissionConfig {
            burst_window: env_secs("BURST_WINDOW_SECS", defaults.admission.burst_window),
        };

        let validation = ValidationConfig {
            max_concurrent_validations: env_or(
                "MAX_CONCURRENT_VALIDATIONS",
                defaults.validation.max_concurrent_validations,
            ),
            result_ttl: env_secs("VALIDATION_RESULT_TTL", defaults.validation.result_ttl),
            limits: SanitizeLimits {
                max_string_length: env_or(
                    "MAX_STRING_LENGTH",
                    defaults.validation.limits.max_string_length,
                ),
                ..defaults.validation.limits.clone()
            },
            ..defaults.validation.clone()
        };

        let pipeline = PipelineConfig {
            max_concurrent_processing: env_or(
                "MAX_CONCURRENT_PROCESSING",
                defaults.pipeline.max_concurrent_processing,
            ),
            max_queue_size: env_or("MAX_QUEUE_SIZE", defaults.pipeline.max_queue_size),
            validation_timeout: env_ms("VALIDATION_TIMEOUT_MS", defaults.pipeline.validation_timeout),
            sla_target: env_ms("SLA_TARGET_MS", defaults.pipeline.sla_target),
            batch_size: env_or("BATCH_SIZE", defaults.pipeline.batch_size),
            tick_interval: env_ms("SCHEDULER_INTERVAL_MS", defaults.pipeline.tick_interval),
            ..defaults.pipeline.clone()
        };

        Self {
            server_port: env_or("SERVER_PORT", defaults.server_port),
            cache,
            admission,
            validation,
            pipeline,
            cleanup_interval: env_ms("CLEANUP_INTERVAL_MS", defaults.cleanup_interval),
            health_interval: env_ms("HEALTH_INTERVAL_MS", defaults.health_interval),
            metrics_interval: env_ms("METRICS_INTERVAL_MS", defaults.metrics_interval),
            telemetry_buffer: env_or("TELEMETRY_BUFFER", defaults.telemetry_buffer),
            shutdown_grace: env_secs("SHUTDOWN_GRACE_SECS", defaults.shutdown_grace),
            tenant_profiles_path: env::var("TENANT_PROFILES_PATH").ok(),
            tenants: env::var("TENANTS").ok(),
        }
    }

    /// Rejects settings the components cannot run with. Processing
    /// concurrency may not exceed the validation capacity.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.cache.nodes > 0, "CACHE_NODES must be at least 1");
        anyhow::ensure!(self.cache.limiter_nodes > 0, "LIMITER_NODES must be at least 1");
        anyhow::ensure!(
            self.pipeline.max_concurrent_processing > 0,
            "MAX_CONCURRENT_PROCESSING must be at least 1"
        );
        anyhow::ensure!(
            self.pipeline.max_concurrent_processing <= self.validation.max_concurrent_validations,
            "MAX_CONCURRENT_PROCESSING ({}) exceeds MAX_CONCURRENT_VALIDATIONS ({})",
            self.pipeline.max_concurrent_processing,
            self.validation.max_concurrent_validations
        );
        Ok(())
    }

    /// Profiles from the JSON file (if set) followed by the inline list.
    pub fn load_tenant_profiles(&self) -> anyhow::Result<Vec<TenantProfile>> {
        let mut profiles = match &self.tenant_profiles_path {
            Some(path) => TenantProfileRegistry::load_file(path)?,
            None => Vec::new(),
        };
        if let Some(inline) = &self.tenants {
            profiles.extend(TenantProfileRegistry::parse_inline(inline));
        }
        Ok(profiles)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            cache: CacheConfig::default(),
            admission: AdmissionConfig::default(),
            validation: ValidationConfig::default(),
            pipeline: PipelineConfig::default(),
            cleanup_interval: Duration::from_secs(1),
            health_interval: Duration::from_secs(5),
            metrics_interval: Duration::from_secs(30),
            telemetry_buffer: 1024,
            shutdown_grace: Duration::from_secs(30),
            tenant_profiles_path: None,
            tenants: None,
        }
    }
}
