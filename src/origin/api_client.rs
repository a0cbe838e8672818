//! Client for the origin's proxy plugin API

use crate::cache::OriginVersionSource;
use crate::config::{ProxySettings, SiteSettings};
use crate::identity::DirectoryUser;
use crate::origin::ApiError;
use crate::proxy::headers::X_PROXY_KEY;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

/// Content version endpoint, returns an integer that grows on every change
pub const LAST_UPDATED_ENDPOINT: &str = "last-updated";

pub const USERS_ENDPOINT: &str = "users";

/// GETs typed metadata from `{origin}/{api_namespace}/{path}`.
///
/// Every request carries the shared proxy secret; there are no retries.
#[derive(Clone)]
pub struct UpstreamApiClient {
    http: reqwest::Client,
    proxy_key: String,
    api_namespace: String,
}

impl UpstreamApiClient {
    pub fn new(settings: &ProxySettings) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()?;
        Ok(Self::with_client(http, settings))
    }

    pub fn with_client(http: reqwest::Client, settings: &ProxySettings) -> Self {
        Self {
            http,
            proxy_key: settings.proxy_key.clone(),
            api_namespace: settings.api_namespace.trim_matches('/').to_string(),
        }
    }

    pub fn endpoint_url(&self, site: &SiteSettings, relative_path: &str) -> String {
        format!(
            "{}/{}/{}",
            site.origin_address(),
            self.api_namespace,
            relative_path.trim_start_matches('/')
        )
    }

    #[instrument(skip(self, site), fields(origin = %site.origin_host()))]
    pub async fn get<T: DeserializeOwned>(
        &self,
        site: &SiteSettings,
        relative_path: &str,
    ) -> Result<T, ApiError> {
        let url = self.endpoint_url(site, relative_path);
        let response = self
            .http
            .get(&url)
            .header(X_PROXY_KEY, &self.proxy_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        let body = response.bytes().await?;
        debug!(bytes = body.len(), "Origin API response received");
        serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    pub async fn last_updated(&self, site: &SiteSettings) -> Result<i64, ApiError> {
        self.get(site, LAST_UPDATED_ENDPOINT).await
    }

    pub async fn users(&self, site: &SiteSettings) -> Result<Vec<DirectoryUser>, ApiError> {
        self.get(site, USERS_ENDPOINT).await
    }
}

#[async_trait]
impl OriginVersionSource for UpstreamApiClient {
    async fn current_version(&self, site: &SiteSettings) -> Result<i64, ApiError> {
        self.last_updated(site).await
    }
}
