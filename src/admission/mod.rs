//! Admission Module
//!
//! Decides whether an incoming request proceeds, based on the tenant's
//! sliding-window rate policy and a per-source burst guard.

mod decision;
mod gate;
mod identity;

pub use decision::{AdmissionDecision, AdmissionRequest, DenyReason};
pub use gate::{AdmissionConfig, AdmissionGate, GateStats};
pub use identity::{Identity, Role};
