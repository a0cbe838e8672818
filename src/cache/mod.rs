//! Two-tier caching: a process-local tier of decoded values in front of a
//! shared tier of encoded strings, invalidated by the origin content version.

mod engine;
mod local;
mod redis;
mod shared;
pub mod value;

pub use engine::{
    origin_version_key, CacheEngine, CachePolicy, OriginVersionRecord, OriginVersionSource,
    MAX_BUILD_ATTEMPTS,
};
pub use local::LocalTier;
pub use redis::RedisSharedCache;
pub use shared::{EntryOptions, InMemorySharedCache, SharedCache};
pub use value::{CacheEntry, CacheValue, Encoded, UNVERSIONED};

use crate::origin::ApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Shared cache unavailable: {0}")]
    SharedTierUnavailable(String),

    #[error("Cache value encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Cache value could not be decoded: {0}")]
    Decode(String),

    #[error("Origin content version unavailable: {0}")]
    OriginVersion(#[from] ApiError),
}
