//! Infrastructure layer for the edge proxy
//!
//! Process-level concerns that are not part of the request pipeline: the
//! tracing subscriber and the centralized log messages.

pub mod log_messages;
pub mod telemetry;

pub use telemetry::init_tracing;
