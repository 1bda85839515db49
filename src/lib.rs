//! Muni Core - cache, admission and content processing for municipal tenants
//!
//! Tenant-namespaced cache cluster, a sliding-window admission gate with a
//! burst guard, a content validation queue and a prioritized processing
//! pipeline, fronted by a thin HTTP API.

pub mod admission;
pub mod api;
pub mod cache;
pub mod config;
pub mod content;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod tasks;
pub mod telemetry;
pub mod tenant;
pub mod validation;

pub use admission::{AdmissionDecision, AdmissionGate, AdmissionRequest};
pub use api::{create_router, AppState};
pub use cache::{CacheCluster, TenantCache};
pub use config::Config;
pub use pipeline::{ContentProcessingPipeline, ProcessingRequest, ProcessingResult};
pub use telemetry::Telemetry;
pub use tenant::{TenantId, TenantProfile, TenantProfileRegistry};
pub use validation::ContentValidationQueue;
