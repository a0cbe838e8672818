//! Main proxy service implementation
//!
//! The `ProxyService` is the HTTP entry point of the edge proxy. It exposes
//! the liveness endpoint and routes every other request through the
//! [`ProxyHandler`] pipeline, wrapped in the middleware stack.
//!
//! ```rust,ignore
//! let service = ProxyService::new(handler, settings.proxy.max_request_size);
//! let router = service.into_router();
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, router).await?;
//! ```

use crate::proxy::handler::ProxyHandler;
use crate::proxy::headers::paths;
use crate::proxy::middleware_stack::ProxyMiddlewareStack;
use crate::proxy::types::ProxyError;
use axum::{
    body::Body,
    extract::{Request, State},
    response::Response,
};
use std::sync::Arc;

pub struct ProxyService {
    handler: Arc<ProxyHandler>,
    max_request_size: usize,
}

impl ProxyService {
    pub fn new(handler: ProxyHandler, max_request_size: usize) -> Self {
        Self {
            handler: Arc::new(handler),
            max_request_size,
        }
    }

    /// Create an Axum router for the proxy service with middleware
    pub fn into_router(self) -> axum::Router {
        let router = axum::Router::new()
            .route(paths::HEALTH, axum::routing::get(health_handler))
            .fallback(proxy_handler)
            .with_state(self.handler);

        ProxyMiddlewareStack::new(self.max_request_size).apply_to_router(router)
    }
}

async fn proxy_handler(
    State(handler): State<Arc<ProxyHandler>>,
    request: Request<Body>,
) -> Result<Response, ProxyError> {
    handler.handle(request).await
}

/// Health check handler
async fn health_handler() -> &'static str {
    "OK"
}
