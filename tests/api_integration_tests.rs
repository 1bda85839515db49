//! Integration Tests for API Endpoints
//!
//! Tests the full request/response cycle through the router, admission
//! middleware and pipeline.

use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use muni_core::{
    api::create_router,
    config::Config,
    tenant::{OperationClass, RateLimitRule, TenantId, TenantProfile, TenantTier},
    AppState, Telemetry,
};
use serde_json::{json, Value};
use tower::ServiceExt;

// == Helper Functions ==

fn tenant(id: &str) -> TenantId {
    TenantId::parse(id).unwrap()
}

fn create_test_state() -> AppState {
    let profiles = vec![
        TenantProfile::for_tier(tenant("springfield"), TenantTier::Standard),
        TenantProfile::for_tier(tenant("capital-city"), TenantTier::Free).with_limit(
            OperationClass::ContentSubmission,
            RateLimitRule {
                window_ms: 60_000,
                max_requests: 2,
            },
        ),
        TenantProfile::for_tier(tenant("ogdenville"), TenantTier::Free),
    ];
    AppState::from_config(&Config::default(), profiles, Telemetry::disabled()).unwrap()
}

fn create_test_app() -> (AppState, Router) {
    let state = create_test_state();
    let app = create_router(state.clone());
    (state, app)
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, tenant: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-tenant-id", tenant)
        .header("x-forwarded-for", "198.51.100.4")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_as(uri: &str, tenant: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-tenant-id", tenant)
        .body(Body::empty())
        .unwrap()
}

fn valid_quiz() -> Value {
    json!({
        "title": "Town history",
        "questions": [
            {"prompt": "Who founded the town?", "options": ["Jebediah", "Shelbyville"], "answer": 0}
        ]
    })
}

/// Submits one item and waits until the pipeline has finished it.
async fn submit_and_process(state: &AppState, app: &Router, owner: &str, id: &str) {
    let response = app
        .clone()
        .oneshot(post_json(
            "/v1/content",
            owner,
            json!({"id": id, "content_type": "quiz", "content": valid_quiz()}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    state.pipeline.tick().await;
    let result = state
        .pipeline
        .wait_for_result(&tenant(owner), id, Duration::from_secs(5))
        .await;
    assert!(result.is_some(), "pipeline did not finish {}", id);
}

// == Health and Stats ==

#[tokio::test]
async fn test_health_endpoint() {
    let (_, app) = create_test_app();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["validation"], "healthy");
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn test_stats_reflect_processed_content() {
    let (state, app) = create_test_app();
    submit_and_process(&state, &app, "springfield", "quiz-stats").await;

    let response = app
        .oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["pipeline"]["total_requests"], 1);
    assert_eq!(json["pipeline"]["processed_requests"], 1);
    assert!(json["admission"]["allowed"].as_u64().unwrap() >= 1);
    assert!(json["cache"]["total_requests"].as_u64().unwrap() > 0);
}

// == Content Submission ==

#[tokio::test]
async fn test_submit_then_fetch_result() {
    let (state, app) = create_test_app();
    submit_and_process(&state, &app, "springfield", "quiz-1").await;

    let response = app
        .oneshot(get_as("/v1/content/quiz-1", "springfield"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["result"]["id"], "quiz-1");
    assert_eq!(json["result"]["success"], true);
    assert!(json["result"]["deployment_package"]["version"].is_string());
}

#[tokio::test]
async fn test_submit_generates_id_when_absent() {
    let (_, app) = create_test_app();

    let response = app
        .oneshot(post_json(
            "/v1/content",
            "springfield",
            json!({"content_type": "scene", "content": {"id": "s1", "elements": []}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_to_json(response.into_body()).await;
    assert!(!json["id"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_submit_rejects_null_content() {
    let (_, app) = create_test_app();

    let response = app
        .oneshot(post_json(
            "/v1/content",
            "springfield",
            json!({"content_type": "scene", "content": null}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_batch_reports_each_item() {
    let (_, app) = create_test_app();

    let response = app
        .oneshot(post_json(
            "/v1/content/batch",
            "springfield",
            json!({"items": [
                {"id": "b-1", "content_type": "quiz", "content": valid_quiz()},
                {"id": "b-2", "content_type": "scene", "content": {"id": "s2", "elements": []}},
                {"id": "b-3", "content_type": "quiz", "content": {"title": "No questions"}, "priority": "urgent"}
            ]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["total"], 3);
    assert_eq!(json["succeeded"], 2);
    assert_eq!(json["results"]["b-3"]["success"], false);
    assert_eq!(json["results"]["b-3"]["failure_kind"], "validation");
}

// == Tenancy ==

#[tokio::test]
async fn test_missing_tenant_header_is_bad_request() {
    let (_, app) = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/content")
                .header("content-type", "application/json")
                .body(Body::from(valid_quiz().to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_tenant_is_bad_request() {
    let (_, app) = create_test_app();

    let response = app
        .oneshot(get_as("/v1/content/anything", "shelbyville"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert!(json["error"].as_str().unwrap().contains("shelbyville"));
}

#[tokio::test]
async fn test_results_are_invisible_to_other_tenants() {
    let (state, app) = create_test_app();
    submit_and_process(&state, &app, "springfield", "private-1").await;

    let response = app
        .clone()
        .oneshot(get_as("/v1/content/private-1", "ogdenville"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(get_as("/v1/validation/private-1", "ogdenville"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_same_id_in_two_tenants_stays_readable_by_both() {
    let (state, app) = create_test_app();
    submit_and_process(&state, &app, "springfield", "report-1").await;
    submit_and_process(&state, &app, "ogdenville", "report-1").await;

    for owner in ["springfield", "ogdenville"] {
        let response = app
            .clone()
            .oneshot(get_as("/v1/content/report-1", owner))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "content for {}", owner);
        let json = body_to_json(response.into_body()).await;
        assert_eq!(json["result"]["success"], true);

        let response = app
            .clone()
            .oneshot(get_as("/v1/validation/report-1", owner))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "validation for {}", owner);
    }
}

#[tokio::test]
async fn test_batch_with_repeated_ids_is_rejected() {
    let (_, app) = create_test_app();
    let item = |id: &str| json!({"id": id, "content_type": "quiz", "content": valid_quiz()});

    let response = app
        .oneshot(post_json(
            "/v1/content/batch",
            "springfield",
            json!({"items": [item("a"), item("a")]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert!(json["error"].as_str().unwrap().contains("duplicate id a"));
}

#[tokio::test]
async fn test_validation_lookup_after_processing() {
    let (state, app) = create_test_app();
    submit_and_process(&state, &app, "springfield", "quiz-v").await;

    let response = app
        .oneshot(get_as("/v1/validation/quiz-v", "springfield"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["validation"]["job_id"], "quiz-v");
    assert_eq!(json["validation"]["status"], "completed");
    assert_eq!(json["validation"]["result"]["is_valid"], true);
}

// == Admission ==

#[tokio::test]
async fn test_rate_limit_returns_429_with_headers() {
    let (_, app) = create_test_app();
    let body = || json!({"content_type": "quiz", "content": valid_quiz()});

    for expected_remaining in ["1", "0"] {
        let response = app
            .clone()
            .oneshot(post_json("/v1/content", "capital-city", body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.headers()["x-ratelimit-limit"], "2");
        assert_eq!(response.headers()["x-ratelimit-remaining"], expected_remaining);
    }

    let response = app
        .oneshot(post_json("/v1/content", "capital-city", body()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response.headers()["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));
    assert!(response.headers().get("x-ratelimit-reset").is_some());

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["retryAfter"], retry_after);
    assert!(json["resetTime"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_reads_use_a_separate_budget() {
    let (_, app) = create_test_app();
    let body = || json!({"content_type": "quiz", "content": valid_quiz()});

    for _ in 0..3 {
        app.clone()
            .oneshot(post_json("/v1/content", "capital-city", body()))
            .await
            .unwrap();
    }

    let response = app
        .oneshot(get_as("/v1/content/anything", "capital-city"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["x-ratelimit-limit"], "100");
}

#[tokio::test]
async fn test_identity_role_raises_budget() {
    let (_, app) = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/content")
                .header("content-type", "application/json")
                .header("x-tenant-id", "capital-city")
                .header("x-user-id", "mayor-quimby")
                .header("x-user-roles", "admin")
                .body(Body::from(
                    json!({"content_type": "quiz", "content": valid_quiz()}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(response.headers()["x-ratelimit-limit"], "4");
}

// == Cache Invalidation ==

#[tokio::test]
async fn test_invalidate_by_tag_clears_tenant_keys() {
    let (state, app) = create_test_app();
    submit_and_process(&state, &app, "springfield", "quiz-inv").await;

    let response = app
        .oneshot(post_json(
            "/v1/cache/invalidate",
            "springfield",
            json!({"tags": ["pipeline"]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["success"], true);
    assert!(json["cleared"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn test_invalidate_leaves_other_tenants_alone() {
    let (state, app) = create_test_app();
    submit_and_process(&state, &app, "springfield", "quiz-keep").await;

    let response = app
        .oneshot(post_json(
            "/v1/cache/invalidate",
            "ogdenville",
            json!({"pattern": "*"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["cleared"], 0);
}

#[tokio::test]
async fn test_invalidate_requires_selector() {
    let (_, app) = create_test_app();

    let response = app
        .oneshot(post_json("/v1/cache/invalidate", "springfield", json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
