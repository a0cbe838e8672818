//! Component wiring and server lifecycle

pub mod app;

pub use app::{Application, PURGE_INTERVAL};
