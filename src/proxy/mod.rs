//! Proxy module: the caching, content-rewriting request pipeline
//!
//! - `handler`: the per-request pipeline from site resolution to caching
//! - `classify`, `rewrite`, `locale`: the pure decisions it is built from
//! - `service`, `middleware`: the axum surface around it

pub mod body;
pub mod classify;
pub mod error_response;
pub mod handler;
pub mod headers;
pub mod locale;
pub mod middleware;
pub mod middleware_stack;
pub mod response_item;
pub mod rewrite;
pub mod service;
pub mod site;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

pub use handler::ProxyHandler;
pub use service::ProxyService;
pub use site::{SiteContext, SiteRegistry};
pub use types::{CacheKey, ProxyError, ProxyResult};
