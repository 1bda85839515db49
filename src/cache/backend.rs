//! Cache Backend Module
//!
//! The seam between the cluster and whatever actually holds the bytes.
//! `MemoryBackend` wraps a `MemoryStore` behind a tokio `RwLock`; every
//! operation is one lock acquisition, so no caller observes a half-applied
//! mutation.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::cache::entry::{CacheEntry, KeyTtl};
use crate::cache::store::{MemoryStore, WindowHit, WindowState};
use crate::cache::GlobPattern;
use crate::error::Result;

// == Cache Backend ==
/// Storage operations a cache node must provide.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<bool>;

    async fn exists(&self, key: &str) -> Result<bool>;

    async fn keys_matching(&self, pattern: &GlobPattern) -> Result<Vec<String>>;

    async fn keys_tagged(&self, tags: &BTreeSet<String>) -> Result<Vec<String>>;

    async fn incr(&self, key: &str, delta: i64) -> Result<i64>;

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    async fn ttl(&self, key: &str) -> Result<KeyTtl>;

    /// Atomic prune + count + conditional append on a sliding window.
    async fn window_hit(&self, key: &str, hit: WindowHit) -> Result<WindowState>;

    /// Liveness probe; returns the number of stored keys.
    async fn ping(&self) -> Result<usize>;

    /// Drops expired keys, returning how many were removed.
    async fn cleanup_expired(&self) -> Result<usize>;
}

// == Memory Backend ==
/// In-process backend holding one `MemoryStore`.
#[derive(Debug)]
pub struct MemoryBackend {
    store: RwLock<MemoryStore>,
}

impl MemoryBackend {
    pub fn new(max_entries: usize) -> Self {
        Self {
            store: RwLock::new(MemoryStore::new(max_entries)),
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        // Write lock: reads touch LRU order and may drop an expired key.
        Ok(self.store.write().await.get(key))
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<()> {
        self.store.write().await.set(key.to_string(), entry)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.store.write().await.delete(key))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.store.write().await.exists(key))
    }

    async fn keys_matching(&self, pattern: &GlobPattern) -> Result<Vec<String>> {
        Ok(self.store.read().await.keys_matching(pattern))
    }

    async fn keys_tagged(&self, tags: &BTreeSet<String>) -> Result<Vec<String>> {
        Ok(self.store.read().await.keys_tagged(tags))
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64> {
        self.store.write().await.incr(key, delta)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        Ok(self.store.write().await.expire(key, ttl))
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        Ok(self.store.write().await.ttl(key))
    }

    async fn window_hit(&self, key: &str, hit: WindowHit) -> Result<WindowState> {
        self.store.write().await.window_hit(key, hit)
    }

    async fn ping(&self) -> Result<usize> {
        Ok(self.store.read().await.len())
    }

    async fn cleanup_expired(&self) -> Result<usize> {
        Ok(self.store.write().await.cleanup_expired())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_round_trip() {
        let backend = MemoryBackend::new(10);
        backend
            .set("k", CacheEntry::new("v".to_string(), Some(Duration::from_secs(5))))
            .await
            .unwrap();

        let entry = backend.get("k").await.unwrap().unwrap();
        assert_eq!(entry.text(), Some("v"));
        assert_eq!(backend.ping().await.unwrap(), 1);
        assert!(backend.delete("k").await.unwrap());
        assert!(!backend.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_incr_is_serialized() {
        let backend = std::sync::Arc::new(MemoryBackend::new(10));
        let mut handles = Vec::new();
        for _ in 0..50 {
            let backend = backend.clone();
            handles.push(tokio::spawn(async move { backend.incr("c", 1).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(backend.incr("c", 0).await.unwrap(), 50);
    }
}
