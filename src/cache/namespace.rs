//! Tenant-scoped view over a `CacheCluster`.
//!
//! Every key, pattern and tag scan is confined to `t:{tenant}:`. Components
//! only ever reach the cache through this view, so one tenant's keys can
//! never be read or invalidated on behalf of another.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::cluster::{CacheCluster, SetOptions};
use crate::cache::store::{WindowHit, WindowState};
use crate::error::Result;
use crate::tenant::TenantId;

#[derive(Debug, Clone)]
pub struct TenantCache {
    cluster: Arc<CacheCluster>,
    prefix: String,
}

impl TenantCache {
    pub fn new(cluster: Arc<CacheCluster>, tenant: &TenantId) -> Self {
        Self {
            cluster,
            prefix: format!("t:{}:", tenant),
        }
    }

    /// Fully qualified key for `key`.
    pub fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub async fn set(&self, key: &str, value: String, options: SetOptions) -> bool {
        self.cluster.set(&self.key(key), value, options).await
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, options: SetOptions) -> bool {
        self.cluster.set_json(&self.key(key), value, options).await
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.cluster.get(&self.key(key)).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.cluster.get_json(&self.key(key)).await
    }

    pub async fn mget(&self, keys: &[&str]) -> Vec<Option<String>> {
        let keys: Vec<String> = keys.iter().map(|k| self.key(k)).collect();
        self.cluster.mget(&keys).await
    }

    pub async fn del(&self, key: &str) -> bool {
        self.cluster.del(&self.key(key)).await
    }

    pub async fn mdel(&self, keys: &[&str]) -> usize {
        let keys: Vec<String> = keys.iter().map(|k| self.key(k)).collect();
        self.cluster.mdel(&keys).await
    }

    /// Clears this tenant's keys matching `pattern` (relative to the tenant).
    pub async fn clear_by_pattern(&self, pattern: &str) -> usize {
        self.cluster.clear_by_pattern(&self.key(pattern)).await
    }

    /// Clears this tenant's entries carrying any of `tags`.
    pub async fn clear_by_tags(&self, tags: &[String]) -> usize {
        self.cluster
            .clear_by_tags_scoped(tags, Some(&self.prefix))
            .await
    }

    pub async fn incr(&self, key: &str, delta: i64) -> Result<i64> {
        self.cluster.incr(&self.key(key), delta).await
    }

    pub async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.cluster.expire(&self.key(key), ttl).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        self.cluster.exists(&self.key(key)).await
    }

    pub async fn ttl(&self, key: &str) -> Result<i64> {
        self.cluster.ttl(&self.key(key)).await
    }

    pub async fn window_hit(&self, key: &str, hit: WindowHit) -> Result<WindowState> {
        self.cluster.window_hit(&self.key(key), hit).await
    }
}
