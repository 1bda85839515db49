//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL, tags and
//! creation metadata.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// == Stored Value ==
/// Payload held by an entry.
///
/// `Text` is the opaque payload written by `set`/`incr`. `Window` is the
/// ordered `(timestamp_ms, nonce)` set backing a sliding rate window.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    Text(String),
    Window(BTreeSet<(u64, String)>),
}

impl StoredValue {
    /// Approximate payload size in bytes.
    pub fn size(&self) -> usize {
        match self {
            StoredValue::Text(text) => text.len(),
            StoredValue::Window(events) => events.iter().map(|(_, nonce)| nonce.len() + 8).sum(),
        }
    }
}

// == Entry Metadata ==
/// Creation metadata recorded alongside every entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Pattern of the policy that supplied the TTL or tags, if any
    pub matched_pattern: Option<String>,
    /// Caller supplied labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored value
    pub value: StoredValue,
    /// Tags used for group invalidation
    pub tags: BTreeSet<String>,
    /// Creation metadata
    pub metadata: EntryMetadata,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a text entry expiring after `ttl` (no expiration when None).
    pub fn new(value: String, ttl: Option<Duration>) -> Self {
        Self::with_value(StoredValue::Text(value), ttl)
    }

    /// Creates an entry holding an arbitrary stored value.
    pub fn with_value(value: StoredValue, ttl: Option<Duration>) -> Self {
        let now = current_timestamp_ms();
        Self {
            value,
            tags: BTreeSet::new(),
            metadata: EntryMetadata {
                created_at: now,
                ..EntryMetadata::default()
            },
            expires_at: ttl.map(|ttl| now + ttl.as_millis() as u64),
        }
    }

    /// Attaches tags to the entry.
    pub fn tagged<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Returns the text payload, if this entry holds one.
    pub fn text(&self) -> Option<&str> {
        match &self.value {
            StoredValue::Text(text) => Some(text),
            StoredValue::Window(_) => None,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time reaches its expiration time.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    /// Expiry check against an explicit clock reading.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        match self.expires_at {
            Some(expires) => now_ms >= expires,
            None => false,
        }
    }

    /// Resets the expiration to `ttl` from now.
    pub fn expire_in(&mut self, ttl: Duration) {
        self.expires_at = Some(current_timestamp_ms() + ttl.as_millis() as u64);
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, or None if no expiration is set.
    ///
    /// Returns `Some(0)` once the TTL has elapsed.
    pub fn ttl_remaining_ms(&self) -> Option<u64> {
        self.expires_at.map(|expires| {
            let now = current_timestamp_ms();
            expires.saturating_sub(now)
        })
    }
}

// == Key TTL ==
/// Remaining lifetime of a key as reported by `ttl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key does not exist (or has expired)
    Missing,
    /// Key exists without an expiration
    Persistent,
    /// Key expires after the given duration
    Expires(Duration),
}

impl KeyTtl {
    /// Redis-style seconds: `-2` missing, `-1` persistent, otherwise the
    /// remaining whole seconds rounded up.
    pub fn as_seconds(&self) -> i64 {
        match self {
            KeyTtl::Missing => -2,
            KeyTtl::Persistent => -1,
            KeyTtl::Expires(remaining) => {
                let ms = remaining.as_millis() as i64;
                (ms + 999) / 1000
            }
        }
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
