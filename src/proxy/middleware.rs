//! Middleware implementations for the proxy service

use crate::proxy::error_response::{extract_request_id, standard_error_response};
use crate::proxy::headers::{CONTENT_TYPE, X_REQUEST_ID};
use axum::{
    extract::Request,
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{error, info};
use uuid::Uuid;

fn new_request_id() -> HeaderValue {
    HeaderValue::from_str(&Uuid::now_v7().to_string())
        .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
}

/// Request ID middleware - ensures every request has a unique ID for tracing
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|existing| existing.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
        .and_then(|uuid| HeaderValue::from_str(&uuid.to_string()).ok())
        .unwrap_or_else(new_request_id);

    request
        .headers_mut()
        .insert(X_REQUEST_ID, request_id.clone());

    let mut response = next.run(request).await;
    response.headers_mut().insert(X_REQUEST_ID, request_id);
    response
}

/// Logging middleware - logs request/response details with timing
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = extract_request_id(request.headers()).unwrap_or_else(|| "unknown".to_string());

    info!(
        request_id = request_id,
        method = %method,
        path = %uri.path(),
        "Incoming request"
    );

    let response = next.run(request).await;
    let duration = start.elapsed();

    info!(
        request_id = request_id,
        method = %method,
        path = %uri.path(),
        status = response.status().as_u16(),
        duration_ms = duration.as_millis(),
        "Request completed"
    );

    response
}

/// Gives bare rejections from inner layers the standard error body and
/// logs server errors with their request id
pub async fn error_handling_middleware(request: Request, next: Next) -> Response {
    let request_id = extract_request_id(request.headers());
    let response = next.run(request).await;
    let status = response.status();

    if status.is_server_error() {
        error!(
            request_id = request_id.as_deref().unwrap_or("unknown"),
            status = status.as_u16(),
            "Request failed"
        );
    }

    // The body limit layer rejects with a plain text body
    let is_bare = !response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));
    if status == StatusCode::PAYLOAD_TOO_LARGE && is_bare {
        return standard_error_response(status, request_id.as_deref());
    }

    response
}
