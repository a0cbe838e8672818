use config::{Config, Environment, File};
use nutype::nutype;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub use config::ConfigError;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub proxy: ProxySettings,
    pub cache: CacheSettings,
    pub storage: StorageSettings,
    pub claims: ClaimSettings,
    pub locale: LocaleSettings,
    #[serde(default)]
    pub sites: HashMap<String, SiteSettings>,
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

#[derive(Deserialize, Clone)]
pub struct ProxySettings {
    /// Shared secret sent to the origin as `X-Proxy-Key`
    pub proxy_key: String,
    /// Namespace of the origin plugin API, relative to the origin address
    pub api_namespace: String,
    /// Path fragment marking origin administration pages (never cached)
    pub admin_path: String,
    pub request_timeout_secs: u64,
    pub max_request_size: usize,
    pub max_response_size: usize,
}

impl std::fmt::Debug for ProxySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxySettings")
            .field("proxy_key", &"<redacted>")
            .field("api_namespace", &self.api_namespace)
            .field("admin_path", &self.admin_path)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_request_size", &self.max_request_size)
            .field("max_response_size", &self.max_response_size)
            .finish()
    }
}

impl ProxySettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheSettings {
    pub default_sliding_secs: u64,
    pub default_absolute_secs: u64,
    /// How often the origin content version may be polled
    pub version_poll_interval_ms: u64,
    /// Lifetime of the cached origin version record itself
    pub version_record_ttl_secs: u64,
    pub user_directory_ttl_secs: u64,
    pub multimedia_ttl_secs: u64,
    /// Blobs up to this size are also buffered in the shared tier
    pub multimedia_buffer_max_bytes: usize,
    pub multimedia_buffer_sliding_secs: u64,
    #[serde(default)]
    pub redis_url: Option<String>,
    pub redis_pool_size: usize,
}

impl CacheSettings {
    pub fn default_sliding(&self) -> Duration {
        Duration::from_secs(self.default_sliding_secs)
    }

    pub fn default_absolute(&self) -> Duration {
        Duration::from_secs(self.default_absolute_secs)
    }

    pub fn version_poll_interval(&self) -> Duration {
        Duration::from_millis(self.version_poll_interval_ms)
    }

    pub fn version_record_ttl(&self) -> Duration {
        Duration::from_secs(self.version_record_ttl_secs)
    }

    pub fn user_directory_ttl(&self) -> Duration {
        Duration::from_secs(self.user_directory_ttl_secs)
    }

    pub fn multimedia_ttl(&self) -> Duration {
        Duration::from_secs(self.multimedia_ttl_secs)
    }

    pub fn multimedia_buffer_sliding(&self) -> Duration {
        Duration::from_secs(self.multimedia_buffer_sliding_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    pub content_root: PathBuf,
}

/// Claim type names read from the authenticated principal
#[derive(Debug, Deserialize, Clone)]
pub struct ClaimSettings {
    pub subject: String,
    pub email: String,
    pub login: String,
    pub organization: String,
    pub subscriber: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocaleSettings {
    pub cookie_names: Vec<String>,
    pub cookie_max_age_secs: u64,
}

/// Host name under which a site is served by the proxy
#[nutype(
    sanitize(trim, lowercase),
    validate(not_empty),
    derive(Debug, Clone, PartialEq, Eq, Hash, Display, AsRef, Deserialize, Serialize)
)]
pub struct SiteHost(String);

#[derive(Debug, Deserialize, Clone)]
pub struct SiteSettings {
    pub proxy_host: SiteHost,
    /// Internal origin address, e.g. `https://cms.internal.example`
    pub origin_address: String,
    #[serde(default = "default_locale")]
    pub default_locale: String,
    #[serde(default = "default_true")]
    pub auto_locale_redirect: bool,
    #[serde(default)]
    pub organization: Option<String>,
}

fn default_locale() -> String {
    "no".to_string()
}

fn default_true() -> bool {
    true
}

impl SiteSettings {
    /// Public address of the site, always https
    pub fn proxy_address(&self) -> String {
        format!("https://{}", self.proxy_host)
    }

    pub fn origin_address(&self) -> &str {
        self.origin_address.trim_end_matches('/')
    }

    /// Origin host (and port) without scheme
    pub fn origin_host(&self) -> &str {
        let address = self.origin_address();
        address
            .strip_prefix("https://")
            .or_else(|| address.strip_prefix("http://"))
            .unwrap_or(address)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
    pub format: String,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let config = Self::with_defaults(Config::builder(), &environment)?
            // Add configuration file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{environment}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix
            .add_source(Environment::with_prefix("CMS_PROXY").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    pub(crate) fn with_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
        environment: &str,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("application.host", "0.0.0.0")?
            .set_default("application.port", 8080)?
            .set_default("application.environment", environment)?
            .set_default("proxy.proxy_key", "")?
            .set_default("proxy.api_namespace", "wp-json/edge-proxy/v1")?
            .set_default("proxy.admin_path", "wp-admin")?
            .set_default("proxy.request_timeout_secs", 100)?
            .set_default("proxy.max_request_size", 10 * 1024 * 1024)?
            .set_default("proxy.max_response_size", 50 * 1024 * 1024)?
            .set_default("cache.default_sliding_secs", 60 * 60)?
            .set_default("cache.default_absolute_secs", 6 * 60 * 60)?
            .set_default("cache.version_poll_interval_ms", 5_000)?
            .set_default("cache.version_record_ttl_secs", 10 * 60)?
            .set_default("cache.user_directory_ttl_secs", 5 * 60)?
            .set_default("cache.multimedia_ttl_secs", 15 * 60)?
            .set_default("cache.multimedia_buffer_max_bytes", 250_000)?
            .set_default("cache.multimedia_buffer_sliding_secs", 60 * 60)?
            .set_default("cache.redis_pool_size", 16)?
            .set_default("storage.content_root", "./content-store")?
            .set_default("claims.subject", "sub")?
            .set_default("claims.email", "email")?
            .set_default("claims.login", "nickname")?
            .set_default("claims.organization", "organization")?
            .set_default("claims.subscriber", "is_subscriber")?
            .set_default("locale.cookie_names", vec!["pll_language"])?
            .set_default("locale.cookie_max_age_secs", 365 * 24 * 60 * 60)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")
    }
}
