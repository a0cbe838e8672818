//! Forwarding of prepared requests to the origin

use async_trait::async_trait;
use axum::body::Body;
use bytes::Bytes;
use http::{Request, Response};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Origin request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Origin connection error: {0}")]
    Connection(String),

    #[error("Invalid origin request: {0}")]
    InvalidRequest(String),
}

/// Sends a fully prepared request (absolute URI, final headers) to the origin.
///
/// Implementations must not follow redirects, keep cookies or decompress
/// bodies: the handler rewrites all of those itself.
#[async_trait]
pub trait OriginTransport: Send + Sync {
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Body>, TransportError>;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        Ok(Self { client, timeout })
    }

    fn map_error(&self, error: reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else if error.is_builder() {
            TransportError::InvalidRequest(error.to_string())
        } else {
            TransportError::Connection(error.to_string())
        }
    }
}

#[async_trait]
impl OriginTransport for ReqwestTransport {
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Body>, TransportError> {
        let request = reqwest::Request::try_from(request)
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| self.map_error(e))?;

        let mut builder = Response::builder()
            .status(response.status())
            .version(response.version());
        if let Some(headers) = builder.headers_mut() {
            headers.extend(
                response
                    .headers()
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone())),
            );
        }

        builder
            .body(Body::from_stream(response.bytes_stream()))
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))
    }
}
