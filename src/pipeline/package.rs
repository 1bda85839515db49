//! Packaging stage: versioned deployment manifest over optimized assets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::pipeline::optimize::OptimizedAssets;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: String,
    pub size: u64,
    /// SHA-256 of the asset body, hex encoded
    pub checksum: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentPackage {
    pub version: String,
    pub content_hash: String,
    pub manifest: Vec<ManifestEntry>,
    pub total_size: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PackageError {
    #[error("Package is {size} bytes; the tenant limit is {limit} bytes")]
    TooLarge { size: u64, limit: u64 },
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// `YYYYmmddHHMMSS-xxxxxxxx`, derived from the content hash and build time.
pub fn package_version(content_hash: &str, at: DateTime<Utc>) -> String {
    let digest = sha256_hex(format!("{}:{}", content_hash, at.timestamp_millis()).as_bytes());
    format!("{}-{}", at.format("%Y%m%d%H%M%S"), &digest[..8])
}

pub fn build_package(
    content_hash: &str,
    assets: &OptimizedAssets,
    limit_bytes: u64,
    at: DateTime<Utc>,
) -> Result<DeploymentPackage, PackageError> {
    let total_size: u64 = assets.assets.iter().map(|a| a.size).sum();
    if total_size > limit_bytes {
        return Err(PackageError::TooLarge {
            size: total_size,
            limit: limit_bytes,
        });
    }

    let manifest = assets
        .assets
        .iter()
        .map(|asset| ManifestEntry {
            path: asset.path.clone(),
            size: asset.size,
            checksum: sha256_hex(asset.body.as_bytes()),
        })
        .collect();

    Ok(DeploymentPackage {
        version: package_version(content_hash, at),
        content_hash: content_hash.to_string(),
        manifest,
        total_size,
        created_at: at,
    })
}
