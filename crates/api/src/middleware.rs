use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tower_http::cors::{AllowOrigin, CorsLayer};
use url::Url;

use crate::rate_limit::RateDecision;
use crate::response::ApiError;
use crate::session::read_cookie_value;
use crate::ApiState;

pub(crate) fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();
    let origins = if origins.is_empty() {
        vec![HeaderValue::from_static("http://localhost:3000")]
    } else {
        origins
    };

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

pub(crate) async fn metrics_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let started = Instant::now();
    let response = next.run(request).await;
    state.metrics.inc_request();
    state.metrics.observe_latency(started.elapsed());
    response
}

pub(crate) async fn rate_limit_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS || request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    let ip = request_ip(request.headers());

    if is_auth_rate_limited_endpoint(path.as_str()) {
        let auth_key = format!("auth:{path}:{ip}");
        if let RateDecision::Limited { retry_after } = state.auth_limiter.check(&auth_key) {
            tracing::warn!(ip = %ip, path = %path, "auth rate limit hit");
            return too_many_requests(
                "Too many attempts, please wait and try again",
                retry_after.as_secs().max(1),
            );
        }
    }

    if let RateDecision::Limited { retry_after } = state.limiter.check(&ip) {
        tracing::warn!(ip = %ip, "rate limit hit");
        return too_many_requests(
            "Too many requests, please try again later",
            retry_after.as_secs().max(1),
        );
    }

    next.run(request).await
}

fn too_many_requests(message: &str, retry_after_seconds: u64) -> Response {
    let mut response = ApiError::new(StatusCode::TOO_MANY_REQUESTS, message).into_response();
    if let Ok(value) = HeaderValue::from_str(&retry_after_seconds.to_string()) {
        response.headers_mut().insert(header::RETRY_AFTER, value);
    }
    response
}

/// Cookie-authenticated state changes must come from an allowed origin.
pub(crate) async fn csrf_origin_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::GET
        || request.method() == Method::HEAD
        || request.method() == Method::OPTIONS
    {
        return next.run(request).await;
    }

    let has_cookie_session =
        read_cookie_value(request.headers(), &state.config.cookie.name).is_some();
    if !has_cookie_session {
        return next.run(request).await;
    }

    let Some(origin) = request_origin_from_headers(request.headers()) else {
        return ApiError::forbidden("Origin header is required").into_response();
    };
    if !state
        .config
        .allowed_origins
        .iter()
        .any(|value| value == &origin)
    {
        tracing::warn!(origin = %origin, "request origin not allowed");
        return ApiError::forbidden("Request origin is not allowed").into_response();
    }

    next.run(request).await
}

pub(crate) async fn security_headers_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'; base-uri 'none'"),
    );
    if state.config.cookie.secure {
        headers.insert(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        );
    }

    response
}

fn is_auth_rate_limited_endpoint(path: &str) -> bool {
    matches!(
        path,
        "/api/auth/register"
            | "/api/auth/verify-email"
            | "/api/auth/login"
            | "/api/auth/forgot-password"
            | "/api/auth/reset-password"
            | "/api/auth/google/start"
            | "/api/auth/google/callback"
    )
}

fn request_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|value| value.to_str().ok())
        })
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "local".to_string())
}

pub(crate) fn request_origin_from_headers(headers: &HeaderMap) -> Option<String> {
    let direct_origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty());
    if direct_origin.is_some() {
        return direct_origin;
    }

    headers
        .get(header::REFERER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Url::parse(value).ok())
        .map(|url| url.origin().ascii_serialization())
        .filter(|value| value != "null")
}
