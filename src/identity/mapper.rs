//! Mapping of authenticated callers onto origin users

use crate::cache::{CacheEngine, EntryOptions};
use crate::config::{CacheSettings, ClaimSettings, SiteSettings};
use crate::identity::{DirectoryUser, IdentityError, OriginUserId, Principal, UserDirectory};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Login of the shared account used by members of the site's organization
pub const MEMBER_LOGIN: &str = "member";

/// Login of the shared account used by subscribers
pub const SUBSCRIBER_LOGIN: &str = "subscriber";

pub fn user_cache_key(site: &SiteSettings, subject: &str) -> String {
    format!("{}|origin-user|{subject}", site.origin_address())
}

pub fn directory_cache_key(site: &SiteSettings) -> String {
    format!("{}|origin-users", site.origin_address())
}

/// The claims of a principal that take part in matching
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchClaims<'a> {
    pub email: Option<&'a str>,
    pub login: Option<&'a str>,
    pub organization: Option<&'a str>,
    pub subscriber: bool,
}

impl<'a> MatchClaims<'a> {
    pub fn from_principal(principal: &'a Principal, claims: &ClaimSettings) -> Self {
        let subscriber = principal
            .claim(&claims.subscriber)
            .map(|value| {
                let value = value.trim();
                value.eq_ignore_ascii_case("true") || value == "1"
            })
            .unwrap_or(false);

        Self {
            email: principal.claim(&claims.email),
            login: principal.claim(&claims.login),
            organization: principal.claim(&claims.organization),
            subscriber,
        }
    }
}

fn equals(candidate: &str, wanted: Option<&str>) -> bool {
    match wanted {
        Some(wanted) => !candidate.is_empty() && candidate.eq_ignore_ascii_case(wanted.trim()),
        None => false,
    }
}

/// First enabled user matching the precedence rules, or the anonymous user
pub fn match_user(
    users: &[DirectoryUser],
    claims: &MatchClaims<'_>,
    site_organization: Option<&str>,
) -> OriginUserId {
    let is_member = match (claims.organization, site_organization) {
        (Some(claimed), Some(site)) => claimed.trim().eq_ignore_ascii_case(site.trim()),
        _ => false,
    };

    let rules: [&dyn Fn(&DirectoryUser) -> bool; 5] = [
        &|user: &DirectoryUser| equals(&user.email, claims.email),
        &|user: &DirectoryUser| equals(&user.login, claims.login),
        &|user: &DirectoryUser| equals(&user.login, claims.organization),
        &|user: &DirectoryUser| is_member && equals(&user.login, Some(MEMBER_LOGIN)),
        &|user: &DirectoryUser| claims.subscriber && equals(&user.login, Some(SUBSCRIBER_LOGIN)),
    ];

    rules
        .iter()
        .find_map(|rule| users.iter().filter(|u| u.is_enabled()).find(|&user| rule(user)))
        .map(|user| OriginUserId::new(user.id))
        .unwrap_or_else(OriginUserId::anonymous)
}

/// Resolves principals to origin user ids through the cached user directory
pub struct IdentityMapper {
    cache: Arc<CacheEngine>,
    directory: Arc<dyn UserDirectory>,
    claims: ClaimSettings,
    user_options: EntryOptions,
    directory_options: EntryOptions,
}

impl IdentityMapper {
    pub fn new(
        cache: Arc<CacheEngine>,
        directory: Arc<dyn UserDirectory>,
        claims: ClaimSettings,
        settings: &CacheSettings,
    ) -> Self {
        Self {
            cache,
            directory,
            claims,
            user_options: EntryOptions::sliding(settings.default_sliding()),
            directory_options: EntryOptions::absolute(settings.user_directory_ttl()),
        }
    }

    #[instrument(skip_all, fields(origin = %site.origin_host()))]
    pub async fn map_to_origin_user(
        &self,
        site: &SiteSettings,
        principal: Option<&Principal>,
    ) -> Result<OriginUserId, IdentityError> {
        let Some(principal) = principal else {
            return Ok(OriginUserId::anonymous());
        };
        let Some(subject) = principal.claim(&self.claims.subject) else {
            return Ok(OriginUserId::anonymous());
        };

        let id: i64 = self
            .cache
            .get_or_create(
                site,
                &user_cache_key(site, subject),
                self.user_options,
                false,
                || async {
                    let users = self.users(site).await?;
                    let claims = MatchClaims::from_principal(principal, &self.claims);
                    let matched = match_user(&users, &claims, site.organization.as_deref());
                    debug!(subject = %subject, user_id = %matched, "Mapped principal to origin user");
                    Ok::<_, IdentityError>(matched.into_inner())
                },
            )
            .await?;

        Ok(OriginUserId::new(id))
    }

    async fn users(&self, site: &SiteSettings) -> Result<Vec<DirectoryUser>, IdentityError> {
        self.cache
            .get_or_create(
                site,
                &directory_cache_key(site),
                self.directory_options,
                false,
                || async {
                    let users = self.directory.users(site).await?;
                    Ok::<_, IdentityError>(users)
                },
            )
            .await
    }
}
