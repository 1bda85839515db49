//! Request and Response models for the HTTP API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{BatchSubmitRequest, InvalidateRequest, SubmitContentRequest};
pub use responses::{
    BatchResponse, ContentResultResponse, HealthResponse, InvalidateResponse,
    RateLimitedResponse, StatsResponse, SubmitResponse, ValidationResultResponse,
};
