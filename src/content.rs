//! Content vocabulary shared by the validation queue and the pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

// == Content Type ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Game,
    Scene,
    Quiz,
    Dialogue,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Game => "game",
            ContentType::Scene => "scene",
            ContentType::Quiz => "quiz",
            ContentType::Dialogue => "dialogue",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Priority ==
/// Ordered priority scale shared by every queue.
///
/// `critical` is accepted as an alias of `urgent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    #[serde(alias = "critical")]
    Urgent,
}

impl Priority {
    /// Numeric rank; higher is served first.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
            Priority::Urgent => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

// == Content Hash ==
/// Deterministic SHA-256 fingerprint of a payload and its type.
///
/// `serde_json` objects serialize with sorted keys, so logically equal
/// documents hash equally regardless of their original key order.
pub fn content_hash(content_type: ContentType, content: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content_type.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(content.to_string().as_bytes());
    hex::encode(hasher.finalize())
}
