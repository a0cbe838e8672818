//! CMS edge proxy - a caching, content-rewriting reverse proxy for CMS origins
//!
//! Authenticated callers are mapped to origin users, responses are cached in
//! a two-tier cache partitioned by that user, and origin addresses in bodies
//! and redirects are rewritten to the public address.

pub mod application;
pub mod cache;
pub mod config;
pub mod error;
pub mod identity;
pub mod infrastructure;
pub mod origin;
pub mod proxy;
pub mod storage;

pub use application::Application;
pub use error::{Error, Result};
