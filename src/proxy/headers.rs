//! HTTP header constants and utilities for the proxy service
//!
//! This module centralizes the header names and well-known paths used
//! between the proxy, its callers and the origin.

use ::http::header::{self, HeaderMap, HeaderName};

/// Mapped origin user id sent to the origin
pub const X_PROXY_USER_ID: &str = "x-proxy-user-id";

/// Shared secret proving to the origin that a request came through the proxy
pub const X_PROXY_KEY: &str = "x-proxy-key";

/// Header name for request ID used for tracing and correlation
pub const X_REQUEST_ID: &str = "x-request-id";

/// Standard header re-exports for convenience
pub use header::{
    ACCEPT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HOST, LOCATION, REFERER, SET_COOKIE,
};

/// Connection-scoped headers that are never forwarded or cached
static HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(name)
}

/// Remove hop-by-hop headers, including any listed in `Connection`
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Well-known paths
pub mod paths {
    /// Health check endpoint path
    pub const HEALTH: &str = "/health";

    /// Local login endpoint of the authentication layer
    pub const LOGIN: &str = "/account/login";

    /// Local logout endpoint of the authentication layer
    pub const LOGOUT: &str = "/account/logout";

    /// Origin script fetching the caller's access token
    pub const ACCESS_TOKEN_SCRIPT: &str = "access-token.php";

    /// Origin script fetching the caller's identity token
    pub const ID_TOKEN_SCRIPT: &str = "id-token.php";

    /// Origin login script, which logs out on `action=logout`
    pub const LOGIN_SCRIPT: &str = "wp-login.php";
}
