//! Tracing subscriber setup

use crate::config::LoggingSettings;
use tracing_subscriber::EnvFilter;

/// Build the filter: `RUST_LOG` wins over the configured level
pub fn env_filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level))
}

/// Install the global subscriber; `json` format or human readable otherwise.
///
/// Returns `false` when a subscriber was already installed.
pub fn init_tracing(settings: &LoggingSettings) -> bool {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter(settings));
    let result = if settings.format.eq_ignore_ascii_case("json") {
        builder.json().try_init()
    } else {
        builder.pretty().try_init()
    };
    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_uses_configured_level() {
        let settings = LoggingSettings {
            level: "cms_edge_proxy=debug".to_string(),
            format: "pretty".to_string(),
        };
        if std::env::var("RUST_LOG").is_err() {
            assert_eq!(env_filter(&settings).to_string(), "cms_edge_proxy=debug");
        }
    }

    #[test]
    fn test_second_init_is_reported() {
        let settings = LoggingSettings {
            level: "warn".to_string(),
            format: "json".to_string(),
        };
        init_tracing(&settings);
        assert!(!init_tracing(&settings));
    }
}
