//! Error types for the tenant services
//!
//! Provides unified error handling using thiserror. Each subsystem owns its
//! error enum; `ApiError` is the only one that knows about HTTP.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Errors raised by a cache backend or the in-memory store.
///
/// Value operations on the cluster swallow these (counting them into the
/// error rate); counter and window primitives return them so the caller can
/// choose its own degradation policy.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    /// Backend could not be reached
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Key is empty or exceeds the maximum length
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Value exceeds the maximum size
    #[error("Value too large: {size} bytes exceeds limit of {limit} bytes")]
    ValueTooLarge { size: usize, limit: usize },

    /// TTL resolved to zero
    #[error("Invalid TTL for key {0}: must be greater than zero")]
    InvalidTtl(String),

    /// Operation does not apply to the stored value kind
    #[error("Wrong value type for key: {0}")]
    WrongType(String),

    /// INCR on a value that does not parse as an integer
    #[error("Value is not an integer: {0}")]
    NotAnInteger(String),

    /// Cache is full and eviction failed
    #[error("Cache full: {0}")]
    CacheFull(String),

    /// Typed value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Cluster was built without any nodes
    #[error("Cache cluster {0} has no nodes")]
    NoNodes(String),
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

// == Admission Error ==
/// Synchronous rejections raised by the admission gate.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdmissionError {
    #[error("Invalid tenant: {0}")]
    InvalidTenant(String),
}

// == Validation Error ==
/// Errors raised by the content validation queue.
///
/// Structurally invalid content is not an error: it comes back as a
/// completed response with `is_valid == false`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Validation capacity exceeded: {in_flight}/{limit} jobs in flight")]
    CapacityExceeded { in_flight: usize, limit: usize },

    #[error("Validation job already in flight: {0}")]
    AlreadyInFlight(String),

    #[error("Validation of job {job_id} exceeded {timeout_ms}ms")]
    TimeoutExceeded { job_id: String, timeout_ms: u64 },

    #[error("Unknown validation job: {0}")]
    UnknownJob(String),

    /// The external structural validator failed to answer
    #[error("Validator unavailable: {0}")]
    ValidatorUnavailable(String),
}

// == Pipeline Error ==
/// Synchronous rejections raised by the processing pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Processing capacity exceeded: {queued} requests queued (limit {limit})")]
    CapacityExceeded { queued: usize, limit: usize },

    #[error("Invalid tenant: {0}")]
    InvalidTenant(String),

    /// The tenant already has a request with this id queued or running
    #[error("Request already in flight: {0}")]
    DuplicateId(String),

    #[error("Pipeline is shutting down")]
    ShuttingDown,
}

impl From<AdmissionError> for PipelineError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::InvalidTenant(id) => PipelineError::InvalidTenant(id),
        }
    }
}

// == API Error ==
/// Errors surfaced at the HTTP boundary.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid tenant: {0}")]
    InvalidTenant(String),

    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<AdmissionError> for ApiError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::InvalidTenant(id) => ApiError::InvalidTenant(id),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::InvalidTenant(id) => ApiError::InvalidTenant(id),
            PipelineError::CapacityExceeded { .. } => ApiError::CapacityExceeded(err.to_string()),
            PipelineError::DuplicateId(_) => ApiError::Conflict(err.to_string()),
            PipelineError::ShuttingDown => ApiError::ServiceUnavailable(err.to_string()),
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidTenant(_) => StatusCode::BAD_REQUEST,
            ApiError::CapacityExceeded(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let body = Json(json!({
            "success": false,
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}
