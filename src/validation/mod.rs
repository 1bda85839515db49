//! Validation Module
//!
//! Structural checks, sanitization and health tracking for submitted
//! content, fronted by a bounded-concurrency queue.

mod health;
mod queue;
mod sanitize;
mod validators;

pub use health::{next_state, HealthSample, HealthState, HealthThresholds};
pub use queue::{
    ContentValidationQueue, JobStatus, QueueHealth, ValidationConfig, ValidationJob,
    ValidationResponse, ValidationResult,
};
pub use sanitize::{sanitize, strip_unsafe, SanitizeLimits, Sanitized};
pub use validators::{check_structure, BuiltinValidators, StructuralReport, StructuralValidator};
