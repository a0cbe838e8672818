//! Log message constants for infrastructure components
//!
//! This module centralizes the log messages of the application lifecycle and
//! its background tasks so wording stays consistent across call sites.

/// Application startup and lifecycle messages
pub mod application {
    pub const STARTING: &str = "Starting CMS edge proxy";
    pub const STARTED_SUCCESSFULLY: &str = "Application started successfully";
    pub const SERVING_SITES: &str = "Serving configured sites";
    pub const NO_SITES_CONFIGURED: &str = "No sites are configured; every request will be rejected";
    pub const SHUTDOWN_SIGNAL: &str = "Shutdown signal received, draining connections";
    pub const SHUTDOWN_SIGNAL_FAILED: &str = "Failed to listen for the shutdown signal";
    pub const STOPPED: &str = "Application stopped";
}

/// Cache tier setup and maintenance messages
pub mod cache {
    pub const USING_REDIS: &str = "Using Redis as the shared cache tier";
    pub const USING_IN_MEMORY: &str = "No Redis URL configured, using the in-process shared tier";
    pub const PURGED_EXPIRED: &str = "Purged expired cache entries";
}

/// Content store setup messages
pub mod storage {
    pub const CONTENT_ROOT: &str = "Content store rooted at directory";
}

/// Configuration and validation messages
pub mod configuration {
    pub const CONFIG_LOADED: &str = "Configuration loaded successfully";
    pub const MISSING_PROXY_KEY: &str =
        "No proxy key configured; origins will reject proxied requests";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_messages_are_not_empty() {
        let messages = [
            application::STARTING,
            application::STARTED_SUCCESSFULLY,
            application::SERVING_SITES,
            application::NO_SITES_CONFIGURED,
            application::SHUTDOWN_SIGNAL,
            application::SHUTDOWN_SIGNAL_FAILED,
            application::STOPPED,
            cache::USING_REDIS,
            cache::USING_IN_MEMORY,
            cache::PURGED_EXPIRED,
            storage::CONTENT_ROOT,
            configuration::CONFIG_LOADED,
            configuration::MISSING_PROXY_KEY,
        ];
        for message in messages {
            assert!(message.len() > 10, "{message}");
        }
    }

    #[test]
    fn test_messages_carry_no_format_placeholders() {
        // Values go into structured fields, never into the message text
        assert!(!application::SERVING_SITES.contains("{}"));
        assert!(!storage::CONTENT_ROOT.contains("{}"));
    }
}
