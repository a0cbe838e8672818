//! Everything that talks to the CMS origin: the metadata API client and the
//! transport used to forward proxied requests.

pub mod api_client;
pub mod transport;

pub use api_client::{UpstreamApiClient, LAST_UPDATED_ENDPOINT, USERS_ENDPOINT};
pub use transport::{OriginTransport, ReqwestTransport, TransportError};

use thiserror::Error;

/// Errors from the origin metadata API
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Origin API request failed with status {status}: {reason}")]
    Status { status: u16, reason: String },

    #[error("Origin API unreachable: {0}")]
    Transport(String),

    #[error("Origin API response could not be decoded: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}
