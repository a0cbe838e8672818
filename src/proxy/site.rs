//! Resolution of the site served for a request host

use crate::config::{Settings, SiteHost, SiteSettings};
use crate::proxy::rewrite::AddressRewriter;
use std::collections::HashMap;
use std::sync::Arc;

/// A configured site together with its prepared address rewriter
#[derive(Debug, Clone)]
pub struct SiteContext {
    pub site: Arc<SiteSettings>,
    pub rewriter: Arc<AddressRewriter>,
}

impl SiteContext {
    pub fn new(site: SiteSettings) -> Result<Self, regex::Error> {
        let rewriter = AddressRewriter::for_site(&site)?;
        Ok(Self {
            site: Arc::new(site),
            rewriter: Arc::new(rewriter),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct SiteRegistry {
    sites: HashMap<SiteHost, SiteContext>,
}

impl SiteRegistry {
    pub fn from_settings(settings: &Settings) -> Result<Self, regex::Error> {
        Self::from_sites(settings.sites.values().cloned())
    }

    pub fn from_sites(sites: impl IntoIterator<Item = SiteSettings>) -> Result<Self, regex::Error> {
        let mut registry = Self::default();
        for site in sites {
            let context = SiteContext::new(site)?;
            registry
                .sites
                .insert(context.site.proxy_host.clone(), context);
        }
        Ok(registry)
    }

    /// Site served under `host`; a port suffix is ignored
    pub fn resolve(&self, host: &str) -> Option<&SiteContext> {
        let host = host.split(':').next().unwrap_or(host);
        let host = SiteHost::try_new(host).ok()?;
        self.sites.get(&host)
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(proxy_host: &str, origin: &str) -> SiteSettings {
        SiteSettings {
            proxy_host: SiteHost::try_new(proxy_host).unwrap(),
            origin_address: origin.to_string(),
            default_locale: "no".to_string(),
            auto_locale_redirect: true,
            organization: None,
        }
    }

    #[test]
    fn test_resolves_configured_hosts() {
        let registry = SiteRegistry::from_sites([
            site("www.one.org", "https://one.internal"),
            site("two.org", "https://two.internal"),
        ])
        .unwrap();

        assert_eq!(registry.len(), 2);
        let one = registry.resolve("WWW.ONE.ORG:443").unwrap();
        assert_eq!(one.site.origin_host(), "one.internal");
        assert_eq!(
            one.rewriter.rewrite("https://one.internal/a"),
            "https://www.one.org/a"
        );
        assert!(registry.resolve("two.org").is_some());
        assert!(registry.resolve("three.org").is_none());
        assert!(registry.resolve("").is_none());
    }
}
