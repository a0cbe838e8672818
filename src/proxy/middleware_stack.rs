//! Middleware stack builder for clean composition
//!
//! This module provides a builder pattern for composing the Tower middleware stack,
//! making it easier to maintain and test the middleware pipeline.

use crate::proxy::middleware::*;
use axum::{middleware::from_fn, Router};
use tower_http::limit::RequestBodyLimitLayer;

/// Builder for composing the proxy middleware stack
#[derive(Debug, Clone, Copy)]
pub struct ProxyMiddlewareStack {
    max_request_size: usize,
}

impl ProxyMiddlewareStack {
    pub fn new(max_request_size: usize) -> Self {
        Self { max_request_size }
    }

    /// Apply the complete middleware stack to a router
    ///
    /// The middleware are applied in the following order (outer to inner):
    /// 1. Request ID generation/propagation
    /// 2. Logging (with request ID)
    /// 3. Error handling
    /// 4. Request body limit
    pub fn apply_to_router<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router
            // Innermost first
            .layer(RequestBodyLimitLayer::new(self.max_request_size))
            .layer(from_fn(error_handling_middleware))
            .layer(from_fn(logging_middleware))
            .layer(from_fn(request_id_middleware))
    }
}
