//! Identity mapping: which origin user a caller is, and therefore which
//! cache partition their dynamic content lives in.

mod mapper;
mod principal;
mod user;

pub use mapper::{
    directory_cache_key, match_user, user_cache_key, IdentityMapper, MatchClaims, MEMBER_LOGIN,
    SUBSCRIBER_LOGIN,
};
pub use principal::Principal;
pub use user::{DirectoryUser, OriginUserId, UserDirectory};

use crate::cache::CacheError;
use crate::origin::ApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("User directory unavailable: {0}")]
    Directory(#[from] ApiError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}
