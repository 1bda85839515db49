//! API Routes
//!
//! Configures the Axum router. Tenant routes live under `/v1` behind the
//! admission middleware; `/stats` and `/health` are open.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    batch_handler, get_content_handler, get_validation_handler, health_handler,
    invalidate_handler, stats_handler, submit_content_handler, AppState,
};
use super::middleware::admission_middleware;

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `POST /v1/content` - Submit content for processing
/// - `POST /v1/content/batch` - Process a batch and wait for every result
/// - `GET /v1/content/:id` - Processing result
/// - `GET /v1/validation/:id` - Validation result
/// - `POST /v1/cache/invalidate` - Clear the caller's keys by tag or pattern
/// - `GET /stats` - Component statistics
/// - `GET /health` - Health check endpoint
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let tenant_routes = Router::new()
        .route("/v1/content", post(submit_content_handler))
        .route("/v1/content/batch", post(batch_handler))
        .route("/v1/content/:id", get(get_content_handler))
        .route("/v1/validation/:id", get(get_validation_handler))
        .route("/v1/cache/invalidate", post(invalidate_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admission_middleware,
        ));

    Router::new()
        .merge(tenant_routes)
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
