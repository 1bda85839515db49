//! API Handlers
//!
//! HTTP request handlers for the content and cache endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use tracing::info;

use crate::admission::AdmissionGate;
use crate::cache::{default_policies, CacheCluster, TenantCache};
use crate::config::Config;
use crate::error::{ApiError, CacheError};
use crate::models::{
    BatchResponse, BatchSubmitRequest, ContentResultResponse, HealthResponse, InvalidateRequest,
    InvalidateResponse, StatsResponse, SubmitContentRequest, SubmitResponse,
    ValidationResultResponse,
};
use crate::pipeline::ContentProcessingPipeline;
use crate::telemetry::Telemetry;
use crate::tenant::{TenantProfile, TenantProfileRegistry};
use crate::validation::{BuiltinValidators, ContentValidationQueue};

use super::middleware::RequestContext;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Result and validation cache
    pub cache: Arc<CacheCluster>,
    /// Counter store for the admission gate
    pub limiter: Arc<CacheCluster>,
    pub tenants: Arc<TenantProfileRegistry>,
    pub gate: Arc<AdmissionGate>,
    pub validation: ContentValidationQueue,
    pub pipeline: ContentProcessingPipeline,
    pub telemetry: Telemetry,
}

impl AppState {
    /// Wires every component from configuration.
    pub fn from_config(
        config: &Config,
        profiles: Vec<TenantProfile>,
        telemetry: Telemetry,
    ) -> Result<Self, CacheError> {
        let cache = Arc::new(CacheCluster::in_memory(
            "cache",
            config.cache.nodes,
            config.cache.max_entries_per_node,
            default_policies(config.cache.default_ttl)?,
        ));
        let limiter = Arc::new(CacheCluster::in_memory(
            "limiter",
            config.cache.limiter_nodes,
            config.cache.limiter_max_entries_per_node,
            default_policies(config.cache.default_ttl)?,
        ));
        let tenants = Arc::new(TenantProfileRegistry::with_profiles(profiles));

        let gate = Arc::new(AdmissionGate::new(
            limiter.clone(),
            tenants.clone(),
            config.admission.clone(),
            telemetry.clone(),
        ));
        let validation = ContentValidationQueue::new(
            cache.clone(),
            Arc::new(BuiltinValidators),
            config.validation.clone(),
            telemetry.clone(),
        );
        let pipeline = ContentProcessingPipeline::new(
            cache.clone(),
            validation.clone(),
            tenants.clone(),
            config.pipeline.clone(),
            telemetry.clone(),
        );

        Ok(Self {
            cache,
            limiter,
            tenants,
            gate,
            validation,
            pipeline,
            telemetry,
        })
    }
}

/// Handler for POST /v1/content
///
/// Queues the content for processing and answers 202 with the request id.
pub async fn submit_content_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<SubmitContentRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    if let Some(error_msg) = req.validate() {
        return Err(ApiError::InvalidRequest(error_msg));
    }

    let id = state
        .pipeline
        .submit_content(req.into_processing(ctx.tenant))
        .await?;

    Ok((StatusCode::ACCEPTED, Json(SubmitResponse::accepted(id))))
}

/// Handler for POST /v1/content/batch
///
/// Runs every item to completion before answering.
pub async fn batch_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<BatchSubmitRequest>,
) -> Result<Json<BatchResponse>, ApiError> {
    if let Some(error_msg) = req.validate() {
        return Err(ApiError::InvalidRequest(error_msg));
    }

    let requests = req
        .items
        .into_iter()
        .map(|item| item.into_processing(ctx.tenant.clone()))
        .collect();
    let results = state.pipeline.process_batch(requests).await;

    Ok(Json(BatchResponse::new(results)))
}

/// Handler for GET /v1/content/:id
pub async fn get_content_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> Result<Json<ContentResultResponse>, ApiError> {
    let result = state
        .pipeline
        .get_result(&ctx.tenant, &id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("no result for {}", id)))?;

    Ok(Json(ContentResultResponse {
        success: true,
        result,
    }))
}

/// Handler for GET /v1/validation/:id
pub async fn get_validation_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> Result<Json<ValidationResultResponse>, ApiError> {
    let validation = state
        .validation
        .get_result(&ctx.tenant, &id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("no validation result for {}", id)))?;

    Ok(Json(ValidationResultResponse {
        success: true,
        validation,
    }))
}

/// Handler for POST /v1/cache/invalidate
///
/// Clears the caller's keys by tag and/or glob pattern. Other tenants'
/// keys are never touched.
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<InvalidateRequest>,
) -> Result<Json<InvalidateResponse>, ApiError> {
    if let Some(error_msg) = req.validate() {
        return Err(ApiError::InvalidRequest(error_msg));
    }

    let cache = TenantCache::new(state.cache.clone(), &ctx.tenant);
    let mut cleared = 0;
    if let Some(tags) = req.tags.as_deref().filter(|tags| !tags.is_empty()) {
        cleared += cache.clear_by_tags(tags).await;
    }
    if let Some(pattern) = &req.pattern {
        cleared += cache.clear_by_pattern(pattern).await;
    }

    info!(tenant = %ctx.tenant, cleared, "Cache invalidated");
    Ok(Json(InvalidateResponse {
        success: true,
        cleared,
    }))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        cache: state.cache.get_metrics().await,
        limiter: state.limiter.get_metrics().await,
        admission: state.gate.stats(),
        validation: state.validation.health().await,
        pipeline: state.pipeline.get_stats().await,
    })
}

/// Handler for GET /health
///
/// Always 200; the body reports `degraded` when a node or the validation
/// queue is unhealthy.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let cache = state.cache.health_check().await;
    let limiter = state.limiter.health_check().await;
    let validation = state.validation.health().await.state;
    Json(HealthResponse::new(cache, limiter, validation))
}
