use crate::config::SiteSettings;
use crate::origin::{ApiError, UpstreamApiClient};
use async_trait::async_trait;
use nutype::nutype;
use serde::{Deserialize, Serialize};

/// Origin user id used as the cache partition of dynamic content; `0` is the
/// anonymous user
#[nutype(derive(
    Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Deserialize, Serialize, From, AsRef
))]
pub struct OriginUserId(i64);

impl OriginUserId {
    pub fn anonymous() -> Self {
        Self::new(0)
    }

    pub fn is_anonymous(&self) -> bool {
        self.into_inner() == 0
    }
}

/// Entry of the origin's user directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryUser {
    #[serde(alias = "ID")]
    pub id: i64,
    #[serde(alias = "Login", default)]
    pub login: String,
    #[serde(alias = "Email", default)]
    pub email: String,
    #[serde(alias = "Status", default)]
    pub status: i64,
    /// Either a list or a map depending on the origin's plugins
    #[serde(alias = "Roles", default)]
    pub roles: serde_json::Value,
}

impl DirectoryUser {
    pub fn is_enabled(&self) -> bool {
        self.status == 0
    }
}

/// Source of the origin's user directory
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn users(&self, site: &SiteSettings) -> Result<Vec<DirectoryUser>, ApiError>;
}

#[async_trait]
impl UserDirectory for UpstreamApiClient {
    async fn users(&self, site: &SiteSettings) -> Result<Vec<DirectoryUser>, ApiError> {
        UpstreamApiClient::users(self, site).await
    }
}
