//! Type definitions for the proxy module

use crate::cache::CacheError;
use crate::identity::IdentityError;
use crate::origin::TransportError;
use crate::storage::StorageError;
use derive_more::Display;
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;

/// Key of a cached response: lowercase SHA-256 hex of the absolute origin URL
/// and the partition discriminator
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn derive(absolute_url: &str, partition: impl std::fmt::Display) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(absolute_url.as_bytes());
        hasher.update(b"|");
        hasher.update(partition.to_string().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Errors that can occur in the proxy
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("No site is configured for host '{0}'")]
    UnknownSite(String),

    #[error("Request too large (max: {max_size} bytes)")]
    RequestTooLarge { max_size: usize },

    #[error("Origin response too large (max: {max_size} bytes)")]
    ResponseTooLarge { max_size: usize },

    #[error("Origin did not respond within {0:?}")]
    OriginTimeout(Duration),

    #[error("Origin unavailable: {0}")]
    OriginUnavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("The caller has no {0}")]
    MissingToken(&'static str),

    #[error("Identity mapping failed: {0}")]
    Identity(#[from] IdentityError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Content store error: {0}")]
    Storage(#[from] StorageError),

    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<TransportError> for ProxyError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Timeout(after) => Self::OriginTimeout(after),
            TransportError::Connection(message) => Self::OriginUnavailable(message),
            TransportError::InvalidRequest(message) => Self::InvalidRequest(message),
        }
    }
}

/// Result type for proxy operations
pub type ProxyResult<T> = Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_cache_key_is_lowercase_sha256_hex() {
        let key = CacheKey::derive("https://cms.internal/page", 5);
        assert_eq!(key.as_str().len(), 64);
        assert!(key
            .as_str()
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert_eq!(
            CacheKey::derive("abc", "").as_str(),
            hex::encode(Sha256::digest(b"abc|"))
        );
    }

    #[test]
    fn test_partitions_separate_keys() {
        let url = "https://cms.internal/page";
        assert_ne!(CacheKey::derive(url, 5), CacheKey::derive(url, 7));
        assert_ne!(CacheKey::derive(url, 0), CacheKey::derive(url, 5));
    }

    proptest! {
        #[test]
        fn prop_cache_key_is_deterministic(url in "https://[a-z]{1,12}\\.example/[ -~]{0,40}", partition in any::<i64>()) {
            prop_assert_eq!(CacheKey::derive(&url, partition), CacheKey::derive(&url, partition));
        }

        #[test]
        fn prop_distinct_partitions_give_distinct_keys(url in "https://[a-z]{1,12}\\.example/[a-z/]{0,20}", a in any::<i64>(), b in any::<i64>()) {
            prop_assume!(a != b);
            prop_assert_ne!(CacheKey::derive(&url, a), CacheKey::derive(&url, b));
        }
    }
}
