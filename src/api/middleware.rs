//! Admission middleware
//!
//! Runs every `/v1` request through the `AdmissionGate` and applies the
//! rate-limit header contract to the response.

use axum::{
    extract::{Request, State},
    http::{header::HeaderName, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::debug;

use crate::admission::{AdmissionDecision, AdmissionRequest, Identity};
use crate::error::ApiError;
use crate::models::RateLimitedResponse;
use crate::tenant::{OperationClass, TenantId};

use super::handlers::AppState;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const USER_HEADER: &str = "x-user-id";
pub const ROLES_HEADER: &str = "x-user-roles";

/// Caller context handed to handlers through request extensions.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub tenant: TenantId,
    pub identity: Option<Identity>,
    pub decision: AdmissionDecision,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Client address from proxy headers: first `X-Forwarded-For` hop, then
/// `X-Real-IP`, else `unknown`.
pub fn extract_source(headers: &HeaderMap) -> String {
    if let Some(forwarded_for) = header_str(headers, "x-forwarded-for") {
        if let Some(first) = forwarded_for.split(',').map(str::trim).find(|s| !s.is_empty()) {
            return first.to_string();
        }
    }
    header_str(headers, "x-real-ip")
        .unwrap_or("unknown")
        .to_string()
}

/// Operation class a route is limited under.
pub fn classify(method: &Method, path: &str) -> OperationClass {
    if path.starts_with("/v1/cache/invalidate") {
        OperationClass::CacheAdmin
    } else if method == Method::POST && path.starts_with("/v1/content") {
        OperationClass::ContentSubmission
    } else {
        OperationClass::Api
    }
}

fn identity_from(headers: &HeaderMap, tenant: &str) -> Option<Identity> {
    let user = header_str(headers, USER_HEADER)?;
    let roles: Vec<&str> = header_str(headers, ROLES_HEADER)
        .map(|raw| raw.split(',').map(str::trim).filter(|r| !r.is_empty()).collect())
        .unwrap_or_default();
    Some(Identity::new(tenant, user, &roles))
}

fn apply_headers(headers: &mut HeaderMap, decision: &AdmissionDecision) {
    for (name, value) in decision.headers() {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("0")),
        );
    }
}

/// Admission middleware for tenant-scoped routes.
///
/// A missing or unknown `X-Tenant-Id` is a 400. A denied request gets a
/// 429 with the `retryAfter`/`resetTime` body; an allowed one carries the
/// `X-RateLimit-*` headers on whatever the handler returns.
pub async fn admission_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let headers = request.headers();
    let Some(tenant_raw) = header_str(headers, TENANT_HEADER).map(str::to_string) else {
        return ApiError::InvalidTenant("missing X-Tenant-Id header".to_string()).into_response();
    };

    let operation = classify(request.method(), request.uri().path());
    let identity = identity_from(headers, &tenant_raw);
    let mut admission = AdmissionRequest::anonymous(&tenant_raw, operation, extract_source(headers));
    if let Some(identity) = identity.clone() {
        admission = admission.with_identity(identity);
    }

    let decision = match state.gate.check(&admission).await {
        Ok(decision) => decision,
        Err(err) => return ApiError::from(err).into_response(),
    };

    if !decision.allowed {
        debug!(
            tenant = %tenant_raw,
            operation = operation.as_str(),
            source = %admission.source,
            "Request denied by admission gate"
        );
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(RateLimitedResponse::from_decision(&decision)),
        )
            .into_response();
        apply_headers(response.headers_mut(), &decision);
        return response;
    }

    // The gate resolved the profile, so the id is well formed.
    let tenant = match TenantId::parse(&tenant_raw) {
        Ok(tenant) => tenant,
        Err(err) => return ApiError::from(err).into_response(),
    };
    request.extensions_mut().insert(RequestContext {
        tenant,
        identity,
        decision: decision.clone(),
    });

    let mut response = next.run(request).await;
    apply_headers(response.headers_mut(), &decision);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_source_prefers_first_forwarded_hop() {
        let map = headers(&[
            ("x-forwarded-for", "203.0.113.7, 10.0.0.1"),
            ("x-real-ip", "10.0.0.2"),
        ]);
        assert_eq!(extract_source(&map), "203.0.113.7");
    }

    #[test]
    fn test_source_falls_back_to_real_ip_then_unknown() {
        assert_eq!(extract_source(&headers(&[("x-real-ip", "10.0.0.2")])), "10.0.0.2");
        assert_eq!(extract_source(&HeaderMap::new()), "unknown");
    }

    #[test]
    fn test_classify_routes() {
        assert_eq!(classify(&Method::POST, "/v1/content"), OperationClass::ContentSubmission);
        assert_eq!(
            classify(&Method::POST, "/v1/content/batch"),
            OperationClass::ContentSubmission
        );
        assert_eq!(classify(&Method::GET, "/v1/content/abc"), OperationClass::Api);
        assert_eq!(
            classify(&Method::POST, "/v1/cache/invalidate"),
            OperationClass::CacheAdmin
        );
    }

    #[test]
    fn test_identity_parses_roles() {
        let map = headers(&[("x-user-id", "homer"), ("x-user-roles", "staff, admin,")]);
        let identity = identity_from(&map, "springfield").unwrap();
        assert_eq!(identity.user_id, "homer");
        assert_eq!(identity.roles, vec!["staff".to_string(), "admin".to_string()]);
        assert!(identity_from(&HeaderMap::new(), "springfield").is_none());
    }
}
