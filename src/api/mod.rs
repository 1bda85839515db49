//! API Module
//!
//! HTTP boundary for the content platform.
//!
//! # Endpoints
//! - `POST /v1/content`, `POST /v1/content/batch` - content submission
//! - `GET /v1/content/:id`, `GET /v1/validation/:id` - result lookup
//! - `POST /v1/cache/invalidate` - tenant cache invalidation
//! - `GET /stats` - component statistics
//! - `GET /health` - health check endpoint

pub mod handlers;
pub mod middleware;
pub mod routes;

pub use handlers::*;
pub use middleware::{admission_middleware, RequestContext};
pub use routes::create_router;
