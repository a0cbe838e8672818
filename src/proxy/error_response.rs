//! Unified error response handling for the proxy service
//!
//! This module provides consistent error formatting across all middleware
//! and handlers, ensuring proper request ID correlation and standardized
//! error messages.

use crate::proxy::headers::X_REQUEST_ID;
use crate::proxy::types::ProxyError;
use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Standard error response format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Unique error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Request ID for correlation
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            request_id: None,
            details: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Convert to HTTP response with proper headers
    pub fn into_response_with_status(self, status: StatusCode) -> Response {
        let request_id = self.request_id.clone();
        let mut response = (status, Json(self)).into_response();

        if let Some(id) = request_id {
            if let Ok(header_value) = HeaderValue::from_str(&id) {
                response.headers_mut().insert(X_REQUEST_ID, header_value);
            }
        }

        response
    }
}

/// Extension trait for consistent error formatting
pub trait ErrorResponseExt {
    fn to_error_response(&self) -> ErrorResponse;

    fn status_code(&self) -> StatusCode;
}

impl ErrorResponseExt for ProxyError {
    fn to_error_response(&self) -> ErrorResponse {
        use ProxyError::*;

        match self {
            UnknownSite(host) => ErrorResponse::new(
                "UNKNOWN_SITE",
                format!("No site is served under '{host}'"),
            ),
            RequestTooLarge { max_size } => ErrorResponse::new(
                "REQUEST_TOO_LARGE",
                format!("Request body exceeds maximum {max_size} bytes"),
            ),
            ResponseTooLarge { max_size } => ErrorResponse::new(
                "RESPONSE_TOO_LARGE",
                format!("Origin response exceeds maximum {max_size} bytes"),
            ),
            OriginTimeout(duration) => ErrorResponse::new(
                "ORIGIN_TIMEOUT",
                format!("Origin did not respond within {duration:?}"),
            ),
            OriginUnavailable(_) => {
                ErrorResponse::new("ORIGIN_UNAVAILABLE", "The origin could not be reached")
            }
            InvalidRequest(msg) => ErrorResponse::new("INVALID_REQUEST", msg.clone()),
            MissingToken(kind) => {
                ErrorResponse::new("UNAUTHORIZED", format!("No {kind} is available"))
            }
            Identity(e) => ErrorResponse::new("IDENTITY_ERROR", "Caller could not be mapped")
                .with_details(serde_json::json!({ "error": e.to_string() })),
            Cache(e) => ErrorResponse::new("CACHE_ERROR", "Origin content version unavailable")
                .with_details(serde_json::json!({ "error": e.to_string() })),
            Storage(_) => ErrorResponse::new("STORAGE_ERROR", "Content store failure"),
            Http(e) => ErrorResponse::new("HTTP_ERROR", format!("HTTP error: {e}")),
            Internal(msg) => ErrorResponse::new("INTERNAL_ERROR", msg.clone()),
        }
    }

    fn status_code(&self) -> StatusCode {
        use ProxyError::*;

        match self {
            UnknownSite(_) => StatusCode::MISDIRECTED_REQUEST,
            RequestTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            InvalidRequest(_) => StatusCode::BAD_REQUEST,
            MissingToken(_) => StatusCode::UNAUTHORIZED,
            OriginTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ResponseTooLarge { .. } | OriginUnavailable(_) | Identity(_) | Cache(_) => {
                StatusCode::BAD_GATEWAY
            }
            Storage(_) | Http(_) | Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Create an error response for common HTTP errors
pub fn standard_error_response(status: StatusCode, request_id: Option<&str>) -> Response {
    let (code, message) = match status {
        StatusCode::BAD_REQUEST => ("BAD_REQUEST", "Invalid request"),
        StatusCode::UNAUTHORIZED => ("UNAUTHORIZED", "Authentication required"),
        StatusCode::NOT_FOUND => ("NOT_FOUND", "Resource not found"),
        StatusCode::METHOD_NOT_ALLOWED => ("METHOD_NOT_ALLOWED", "Method not allowed"),
        StatusCode::PAYLOAD_TOO_LARGE => ("PAYLOAD_TOO_LARGE", "Request too large"),
        StatusCode::MISDIRECTED_REQUEST => ("UNKNOWN_SITE", "No site is served under this host"),
        StatusCode::INTERNAL_SERVER_ERROR => ("INTERNAL_ERROR", "Internal server error"),
        StatusCode::BAD_GATEWAY => ("BAD_GATEWAY", "Origin error"),
        StatusCode::GATEWAY_TIMEOUT => ("GATEWAY_TIMEOUT", "Origin timeout"),
        _ => ("ERROR", "An error occurred"),
    };

    let mut error = ErrorResponse::new(code, message);
    if let Some(id) = request_id {
        error = error.with_request_id(id);
    }

    error.into_response_with_status(status)
}

/// Helper to extract request ID from headers
pub fn extract_request_id(headers: &http::HeaderMap) -> Option<String> {
    headers
        .get(X_REQUEST_ID)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(error = %self, status = status.as_u16(), "Proxy request failed");
        }
        self.to_error_response().into_response_with_status(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::origin::TransportError;
    use std::time::Duration;

    #[test]
    fn test_error_response_with_request_id() {
        let error = ErrorResponse::new("TEST_ERROR", "Test error").with_request_id("req-123");
        assert_eq!(error.request_id, Some("req-123".to_string()));
        assert!(error.details.is_none());
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (ProxyError::UnknownSite("x".into()), StatusCode::MISDIRECTED_REQUEST),
            (ProxyError::RequestTooLarge { max_size: 1 }, StatusCode::PAYLOAD_TOO_LARGE),
            (ProxyError::ResponseTooLarge { max_size: 1 }, StatusCode::BAD_GATEWAY),
            (
                TransportError::Timeout(Duration::from_secs(1)).into(),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                TransportError::Connection("refused".into()).into(),
                StatusCode::BAD_GATEWAY,
            ),
            (ProxyError::MissingToken("access token"), StatusCode::UNAUTHORIZED),
            (ProxyError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, expected) in cases {
            assert_eq!(error.status_code(), expected, "{error}");
        }
    }

    #[test]
    fn test_unknown_site_code() {
        let response = ProxyError::UnknownSite("nowhere.example".into()).to_error_response();
        assert_eq!(response.code, "UNKNOWN_SITE");
        assert!(response.message.contains("nowhere.example"));
    }

    #[test]
    fn test_standard_error_responses() {
        let response = standard_error_response(StatusCode::NOT_FOUND, Some("req-123"));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key(X_REQUEST_ID));
    }

    #[test]
    fn test_extract_request_id() {
        let mut headers = http::HeaderMap::new();
        assert_eq!(extract_request_id(&headers), None);
        headers.insert(X_REQUEST_ID, HeaderValue::from_static("abc"));
        assert_eq!(extract_request_id(&headers), Some("abc".to_string()));
    }
}
