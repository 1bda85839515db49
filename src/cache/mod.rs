//! Cache Module
//!
//! Tenant-namespaced, multi-node cache with glob TTL policies, tag
//! invalidation, LRU capacity eviction and per-operation metrics.

mod backend;
mod cluster;
mod entry;
mod lru;
mod namespace;
mod policy;
mod stats;
mod store;


// Re-export public types
pub use backend::{CacheBackend, MemoryBackend};
pub use cluster::{CacheCluster, ClusterHealth, NodeStatus, SetOptions};
pub use entry::{current_timestamp_ms, CacheEntry, EntryMetadata, KeyTtl, StoredValue};
pub use lru::LruTracker;
pub use namespace::TenantCache;
pub use policy::{default_policies, CachePolicy, GlobPattern, PolicySet, ResolvedPolicy};
pub use stats::{CacheMetrics, MetricsSnapshot};
pub use store::{MemoryStore, WindowHit, WindowState};

// == Public Constants ==
/// Maximum allowed key length in bytes (tenant prefix included)
pub const MAX_KEY_LENGTH: usize = 512;

/// Maximum allowed value size in bytes
pub const MAX_VALUE_SIZE: usize = 8 * 1024 * 1024; // 8 MiB
