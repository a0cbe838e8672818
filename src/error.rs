use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Shared cache setup failed: {0}")]
    SharedCache(#[from] crate::cache::CacheError),

    #[error("Origin API client setup failed: {0}")]
    ApiClient(#[from] crate::origin::ApiError),

    #[error("Origin transport setup failed: {0}")]
    Transport(#[from] crate::origin::TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
