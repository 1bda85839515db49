//! Memory Store Module
//!
//! Single-node keyspace: HashMap storage with LRU capacity eviction, lazy
//! TTL expiry, tag scans and the sliding-window primitive used by the
//! admission gate.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use crate::cache::entry::{current_timestamp_ms, CacheEntry, KeyTtl, StoredValue};
use crate::cache::{GlobPattern, LruTracker, MAX_KEY_LENGTH, MAX_VALUE_SIZE};
use crate::error::{CacheError, Result};

// == Window Types ==
/// One sliding-window admission attempt.
#[derive(Debug, Clone)]
pub struct WindowHit {
    /// Event time (Unix milliseconds)
    pub now_ms: u64,
    /// Trailing window length
    pub window: Duration,
    /// Maximum events allowed inside the window
    pub limit: u64,
    /// Unique member recorded for this event
    pub member: String,
}

/// Window state after a hit was evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    /// Whether the event was recorded
    pub admitted: bool,
    /// Events inside the window after this hit
    pub count: u64,
    /// Timestamp of the oldest event still inside the window
    pub oldest_ms: Option<u64>,
}

// == Memory Store ==
/// In-memory keyspace for one cache node.
#[derive(Debug)]
pub struct MemoryStore {
    entries: HashMap<String, CacheEntry>,
    lru: LruTracker,
    max_entries: usize,
    evictions: u64,
}

impl MemoryStore {
    // == Constructor ==
    /// Creates a store holding at most `max_entries` keys.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            max_entries: max_entries.max(1),
            evictions: 0,
        }
    }

    // == Set ==
    /// Stores an entry, overwriting any previous value and its TTL.
    ///
    /// If the store is at capacity, the least recently used key is evicted.
    pub fn set(&mut self, key: String, entry: CacheEntry) -> Result<()> {
        validate_key(&key)?;

        let size = entry.value.size();
        if size > MAX_VALUE_SIZE {
            return Err(CacheError::ValueTooLarge {
                size,
                limit: MAX_VALUE_SIZE,
            });
        }

        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            match self.lru.evict_oldest() {
                Some(evicted) => {
                    self.entries.remove(&evicted);
                    self.evictions += 1;
                }
                None => {
                    return Err(CacheError::CacheFull(
                        "Cache is full and eviction failed".to_string(),
                    ))
                }
            }
        }

        self.lru.touch(&key);
        self.entries.insert(key, entry);
        Ok(())
    }

    // == Get ==
    /// Returns a live entry, removing it first if it has expired.
    pub fn get(&mut self, key: &str) -> Option<CacheEntry> {
        if self.evict_if_expired(key) {
            return None;
        }
        let entry = self.entries.get(key)?.clone();
        self.lru.touch(key);
        Some(entry)
    }

    // == Delete ==
    /// Removes a key, returning whether it existed.
    pub fn delete(&mut self, key: &str) -> bool {
        let existed = self
            .entries
            .remove(key)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false);
        self.lru.remove(key);
        existed
    }

    pub fn exists(&mut self, key: &str) -> bool {
        !self.evict_if_expired(key) && self.entries.contains_key(key)
    }

    /// Live keys matching a glob pattern.
    pub fn keys_matching(&self, pattern: &GlobPattern) -> Vec<String> {
        let now = current_timestamp_ms();
        self.entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired_at(now) && pattern.matches(key))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Live keys whose tag set intersects `tags`.
    pub fn keys_tagged(&self, tags: &BTreeSet<String>) -> Vec<String> {
        let now = current_timestamp_ms();
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now) && !entry.tags.is_disjoint(tags))
            .map(|(key, _)| key.clone())
            .collect()
    }

    // == Incr ==
    /// Adds `delta` to an integer value, creating it (without TTL) when
    /// missing. An existing expiry is kept.
    pub fn incr(&mut self, key: &str, delta: i64) -> Result<i64> {
        self.evict_if_expired(key);

        let next = match self.entries.get(key) {
            None => delta,
            Some(entry) => match &entry.value {
                StoredValue::Text(text) => text
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| CacheError::NotAnInteger(key.to_string()))?
                    .checked_add(delta)
                    .ok_or_else(|| CacheError::NotAnInteger(key.to_string()))?,
                StoredValue::Window(_) => return Err(CacheError::WrongType(key.to_string())),
            },
        };

        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.value = StoredValue::Text(next.to_string());
                self.lru.touch(key);
            }
            None => self.set(key.to_string(), CacheEntry::new(next.to_string(), None))?,
        }
        Ok(next)
    }

    // == Expire ==
    /// Sets a key's TTL. A zero TTL deletes the key.
    pub fn expire(&mut self, key: &str, ttl: Duration) -> bool {
        if self.evict_if_expired(key) {
            return false;
        }
        if ttl.is_zero() {
            return self.delete(key);
        }
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.expire_in(ttl);
                true
            }
            None => false,
        }
    }

    pub fn ttl(&mut self, key: &str) -> KeyTtl {
        if self.evict_if_expired(key) {
            return KeyTtl::Missing;
        }
        match self.entries.get(key) {
            None => KeyTtl::Missing,
            Some(entry) => match entry.ttl_remaining_ms() {
                None => KeyTtl::Persistent,
                Some(ms) => KeyTtl::Expires(Duration::from_millis(ms)),
            },
        }
    }

    // == Window Hit ==
    /// Prunes, counts and conditionally records one sliding-window event.
    ///
    /// Events at or before `now - window` are dropped. The hit is recorded
    /// only while the pruned count is below the limit; recording refreshes
    /// the key's expiry to the window length.
    pub fn window_hit(&mut self, key: &str, hit: WindowHit) -> Result<WindowState> {
        self.evict_if_expired(key);

        let cutoff = hit.now_ms.saturating_sub(hit.window.as_millis() as u64);
        let mut events = match self.entries.get(key).map(|entry| &entry.value) {
            None => BTreeSet::new(),
            Some(StoredValue::Window(events)) => events.clone(),
            Some(StoredValue::Text(_)) => return Err(CacheError::WrongType(key.to_string())),
        };
        events.retain(|(ts, _)| *ts > cutoff);

        let admitted = (events.len() as u64) < hit.limit;
        if admitted {
            events.insert((hit.now_ms, hit.member));
        }
        let state = WindowState {
            admitted,
            count: events.len() as u64,
            oldest_ms: events.iter().next().map(|(ts, _)| *ts),
        };

        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.value = StoredValue::Window(events);
                if admitted {
                    entry.expire_in(hit.window);
                }
                self.lru.touch(key);
            }
            None if admitted => {
                let entry = CacheEntry::with_value(StoredValue::Window(events), Some(hit.window));
                self.set(key.to_string(), entry)?;
            }
            None => {}
        }

        Ok(state)
    }

    // == Cleanup Expired ==
    /// Removes all expired entries, returning how many were removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let now = current_timestamp_ms();
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            self.entries.remove(key);
            self.lru.remove(key);
        }
        expired_keys.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    fn evict_if_expired(&mut self, key: &str) -> bool {
        let expired = self
            .entries
            .get(key)
            .map(|entry| entry.is_expired())
            .unwrap_or(false);
        if expired {
            self.entries.remove(key);
            self.lru.remove(key);
        }
        expired
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidKey(format!(
            "key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}
