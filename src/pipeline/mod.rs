//! Pipeline Module
//!
//! Multi-stage content processing: validation through the validation
//! queue, optimization, packaging and an SLA check, scheduled by priority.

mod optimize;
mod package;
#[allow(clippy::module_inception)]
mod pipeline;
mod request;
mod scheduler;

pub use optimize::{collapse_whitespace, minify_script, optimize, Asset, OptimizedAssets, CONTENT_ASSET};
pub use package::{build_package, package_version, DeploymentPackage, ManifestEntry, PackageError};
pub use pipeline::{
    content_class_ttl, ContentProcessingPipeline, PipelineConfig, PipelineStats, ShutdownReport,
};
pub use request::{FailureKind, ProcessingRequest, ProcessingResult, RequestMetadata, StageMetrics};
pub use scheduler::PendingQueue;
