//! Cache Cluster Module
//!
//! Routes keys across nodes, applies TTL policies and records metrics on
//! every call. The cluster is never on the correctness path: value
//! operations catch backend errors, count them, and return a safe default.
//! Counter and window primitives return the error instead, because their
//! caller (the admission gate) owns the degradation policy.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::cache::backend::{CacheBackend, MemoryBackend};
use crate::cache::entry::CacheEntry;
use crate::cache::stats::{CacheMetrics, MetricsSnapshot};
use crate::cache::store::{WindowHit, WindowState};
use crate::cache::{GlobPattern, PolicySet};
use crate::error::{CacheError, Result};

// == Set Options ==
/// Optional arguments to `set`.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Explicit TTL, overriding any policy
    pub ttl: Option<Duration>,
    /// Tags added on top of the matched policy's tags
    pub tags: Vec<String>,
    /// Free-form labels stored in the entry metadata
    pub metadata: BTreeMap<String, String>,
}

impl SetOptions {
    pub fn ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

// == Health ==
/// Result of probing one node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub name: String,
    pub healthy: bool,
    pub entries: usize,
    pub latency_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of `health_check`.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterHealth {
    pub healthy: bool,
    pub nodes: Vec<NodeStatus>,
}

// == Cache Node ==
struct CacheNode {
    name: String,
    backend: Arc<dyn CacheBackend>,
}

// == Cache Cluster ==
/// Multi-node, policy-driven cache.
pub struct CacheCluster {
    name: String,
    nodes: Vec<CacheNode>,
    policies: PolicySet,
    metrics: CacheMetrics,
    node_health: RwLock<BTreeMap<String, bool>>,
    probe_timeout: Duration,
}

impl CacheCluster {
    // == Constructor ==
    /// Builds a cluster over the given named backends. An empty node list
    /// is rejected.
    pub fn new(
        name: impl Into<String>,
        nodes: Vec<(String, Arc<dyn CacheBackend>)>,
        policies: PolicySet,
    ) -> Result<Self> {
        let name = name.into();
        if nodes.is_empty() {
            return Err(CacheError::NoNodes(name));
        }
        Ok(Self::with_nodes(name, nodes, policies))
    }

    fn with_nodes(
        name: String,
        nodes: Vec<(String, Arc<dyn CacheBackend>)>,
        policies: PolicySet,
    ) -> Self {
        let node_health = nodes.iter().map(|(name, _)| (name.clone(), true)).collect();
        Self {
            name,
            nodes: nodes
                .into_iter()
                .map(|(name, backend)| CacheNode { name, backend })
                .collect(),
            policies,
            metrics: CacheMetrics::new(),
            node_health: RwLock::new(node_health),
            probe_timeout: Duration::from_secs(1),
        }
    }

    /// Cluster of `node_count` in-memory nodes.
    pub fn in_memory(
        name: impl Into<String>,
        node_count: usize,
        max_entries_per_node: usize,
        policies: PolicySet,
    ) -> Self {
        let name = name.into();
        let nodes = (0..node_count.max(1))
            .map(|i| {
                let backend: Arc<dyn CacheBackend> =
                    Arc::new(MemoryBackend::new(max_entries_per_node));
                (format!("{}-{}", name, i), backend)
            })
            .collect();
        Self::with_nodes(name, nodes, policies)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn node_for(&self, key: &str) -> &CacheNode {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() % self.nodes.len() as u64) as usize;
        &self.nodes[index]
    }

    async fn observe<T>(
        &self,
        op: &'static str,
        key: &str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let started = Instant::now();
        let result = call.await;
        self.metrics.record_request(started.elapsed());
        if let Err(err) = &result {
            self.metrics.record_error();
            warn!(cluster = %self.name, op, key, error = %err, "Cache operation failed");
        }
        result
    }

    // == Set ==
    /// Stores `value` under `key`. Returns false (and stores nothing) when
    /// the resolved TTL is not positive or the backend fails.
    pub async fn set(&self, key: &str, value: String, options: SetOptions) -> bool {
        let resolved = match self.policies.resolve(key, options.ttl) {
            Ok(resolved) => resolved,
            Err(err) => {
                self.metrics.record_error();
                warn!(cluster = %self.name, key, error = %err, "Refusing cache write");
                return false;
            }
        };

        let mut entry = CacheEntry::new(value, Some(resolved.ttl))
            .tagged(resolved.tags)
            .tagged(options.tags);
        entry.metadata.matched_pattern = resolved.matched_pattern;
        entry.metadata.labels = options.metadata;

        let node = self.node_for(key);
        self.observe("set", key, node.backend.set(key, entry))
            .await
            .is_ok()
    }

    /// Serializes `value` as JSON and stores it.
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, options: SetOptions) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.set(key, json, options).await,
            Err(err) => {
                self.metrics.record_error();
                warn!(cluster = %self.name, key, error = %err, "Failed to encode cache value");
                false
            }
        }
    }

    // == Get ==
    pub async fn get(&self, key: &str) -> Option<String> {
        let node = self.node_for(key);
        let entry = self
            .observe("get", key, node.backend.get(key))
            .await
            .ok()
            .flatten();

        match entry.as_ref().and_then(CacheEntry::text) {
            Some(text) => {
                self.metrics.record_hit();
                Some(text.to_string())
            }
            None => {
                self.metrics.record_miss();
                None
            }
        }
    }

    /// Reads and decodes a JSON value; a decode failure counts as an error.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                self.metrics.record_error();
                warn!(
                    cluster = %self.name,
                    key,
                    error = %CacheError::Serialization(err.to_string()),
                    "Discarding undecodable cache value"
                );
                None
            }
        }
    }

    pub async fn mget(&self, keys: &[String]) -> Vec<Option<String>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get(key).await);
        }
        values
    }

    // == Delete ==
    pub async fn del(&self, key: &str) -> bool {
        let node = self.node_for(key);
        self.observe("del", key, node.backend.delete(key))
            .await
            .unwrap_or(false)
    }

    /// Deletes several keys, returning how many existed.
    pub async fn mdel(&self, keys: &[String]) -> usize {
        let mut removed = 0;
        for key in keys {
            if self.del(key).await {
                removed += 1;
            }
        }
        removed
    }

    // == Clear By Pattern ==
    /// Deletes every key matching the glob, returning the count.
    pub async fn clear_by_pattern(&self, pattern: &str) -> usize {
        let glob = match GlobPattern::new(pattern) {
            Ok(glob) => glob,
            Err(err) => {
                self.metrics.record_error();
                warn!(cluster = %self.name, pattern, error = %err, "Invalid clear pattern");
                return 0;
            }
        };

        let mut removed = 0;
        for node in &self.nodes {
            let keys = self
                .observe("keys", pattern, node.backend.keys_matching(&glob))
                .await
                .unwrap_or_default();
            for key in keys {
                if self
                    .observe("del", &key, node.backend.delete(&key))
                    .await
                    .unwrap_or(false)
                {
                    removed += 1;
                }
            }
        }
        debug!(cluster = %self.name, pattern, removed, "Cleared keys by pattern");
        removed
    }

    // == Clear By Tags ==
    /// Deletes every entry whose tags intersect `tags`.
    pub async fn clear_by_tags(&self, tags: &[String]) -> usize {
        self.clear_by_tags_scoped(tags, None).await
    }

    /// Tag invalidation restricted to keys starting with `prefix`.
    pub async fn clear_by_tags_scoped(&self, tags: &[String], prefix: Option<&str>) -> usize {
        let wanted: BTreeSet<String> = tags.iter().cloned().collect();
        if wanted.is_empty() {
            return 0;
        }

        let mut removed = 0;
        for node in &self.nodes {
            let keys = self
                .observe("tags", prefix.unwrap_or("*"), node.backend.keys_tagged(&wanted))
                .await
                .unwrap_or_default();
            for key in keys {
                if prefix.is_some_and(|prefix| !key.starts_with(prefix)) {
                    continue;
                }
                if self
                    .observe("del", &key, node.backend.delete(&key))
                    .await
                    .unwrap_or(false)
                {
                    removed += 1;
                }
            }
        }
        debug!(cluster = %self.name, ?tags, removed, "Cleared keys by tags");
        removed
    }

    // == Primitives ==
    /// Adds `delta` to the integer at `key`, creating it when missing.
    pub async fn incr(&self, key: &str, delta: i64) -> Result<i64> {
        let node = self.node_for(key);
        self.observe("incr", key, node.backend.incr(key, delta)).await
    }

    /// Sets the TTL of an existing key.
    pub async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let node = self.node_for(key);
        self.observe("expire", key, node.backend.expire(key, ttl)).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        let node = self.node_for(key);
        self.observe("exists", key, node.backend.exists(key)).await
    }

    /// Remaining TTL in seconds: `-1` without expiry, `-2` when missing.
    pub async fn ttl(&self, key: &str) -> Result<i64> {
        let node = self.node_for(key);
        self.observe("ttl", key, node.backend.ttl(key))
            .await
            .map(|ttl| ttl.as_seconds())
    }

    /// Atomic sliding-window hit on `key`.
    pub async fn window_hit(&self, key: &str, hit: WindowHit) -> Result<WindowState> {
        let node = self.node_for(key);
        self.observe("window", key, node.backend.window_hit(key, hit))
            .await
    }

    // == Health Check ==
    /// Probes every node with a timeout and records the outcome.
    pub async fn health_check(&self) -> ClusterHealth {
        let mut statuses = Vec::with_capacity(self.nodes.len());

        for node in &self.nodes {
            let started = Instant::now();
            let probe = tokio::time::timeout(self.probe_timeout, node.backend.ping()).await;
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

            let (healthy, entries, error) = match probe {
                Ok(Ok(entries)) => (true, entries, None),
                Ok(Err(err)) => (false, 0, Some(err.to_string())),
                Err(_) => (false, 0, Some("health probe timed out".to_string())),
            };
            if !healthy {
                warn!(cluster = %self.name, node = %node.name, ?error, "Cache node unhealthy");
            }
            statuses.push(NodeStatus {
                name: node.name.clone(),
                healthy,
                entries,
                latency_ms,
                error,
            });
        }

        {
            let mut health = self.node_health.write().await;
            for status in &statuses {
                health.insert(status.name.clone(), status.healthy);
            }
        }

        ClusterHealth {
            healthy: statuses.iter().all(|s| s.healthy),
            nodes: statuses,
        }
    }

    // == Metrics ==
    pub async fn get_metrics(&self) -> MetricsSnapshot {
        let node_health = self.node_health.read().await.clone();
        self.metrics.snapshot(node_health)
    }

    /// Sweeps expired keys on every node.
    pub async fn cleanup_expired(&self) -> usize {
        let mut removed = 0;
        for node in &self.nodes {
            match node.backend.cleanup_expired().await {
                Ok(count) => removed += count,
                Err(err) => {
                    self.metrics.record_error();
                    warn!(cluster = %self.name, node = %node.name, error = %err, "Cleanup failed");
                }
            }
        }
        removed
    }
}

impl std::fmt::Debug for CacheCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheCluster")
            .field("name", &self.name)
            .field("nodes", &self.nodes.len())
            .field("policies", &self.policies.len())
            .finish()
    }
}
