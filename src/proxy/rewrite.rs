//! Substitution of the origin address with the public proxy address

use crate::config::SiteSettings;
use regex::{Captures, Regex};
use std::collections::HashMap;

/// Rewrites every known spelling of a site's origin address to the proxy
/// address in the same spelling, then upgrades leftover `http://` links.
///
/// Substitution is a single left-to-right pass, so replaced text is never
/// matched again.
#[derive(Debug, Clone)]
pub struct AddressRewriter {
    pattern: Regex,
    replacements: HashMap<String, String>,
}

/// The forms an absolute address prefix can take inside a body
fn spellings(scheme: &str, host: &str) -> [String; 4] {
    let encoded_host = urlencoding::encode(host);
    [
        format!("{scheme}://{host}"),
        format!("{scheme}:\\/\\/{host}"),
        format!("{scheme}%3A%2F%2F{encoded_host}"),
        format!("{scheme}%3a%2f%2f{encoded_host}"),
    ]
}

fn alternate_host(host: &str) -> String {
    match host.strip_prefix("www.") {
        Some(bare) => bare.to_string(),
        None => format!("www.{host}"),
    }
}

impl AddressRewriter {
    pub fn new(origin_host: &str, proxy_host: &str) -> Result<Self, regex::Error> {
        let targets = spellings("https", proxy_host);
        let mut replacements = HashMap::new();

        for host in [origin_host.to_string(), alternate_host(origin_host)] {
            for scheme in ["https", "http"] {
                for (source, target) in spellings(scheme, &host).into_iter().zip(targets.iter()) {
                    replacements.entry(source).or_insert_with(|| target.clone());
                }
            }
        }

        let mut sources: Vec<&String> = replacements.keys().collect();
        // Longest first so that a longer spelling wins over its prefix
        sources.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let mut alternatives: Vec<String> = sources.iter().map(|s| regex::escape(s)).collect();
        alternatives.push(regex::escape("http://"));
        alternatives.push(regex::escape("http:\\/\\/"));
        let pattern = Regex::new(&alternatives.join("|"))?;

        replacements.insert("http://".to_string(), "https://".to_string());
        replacements.insert("http:\\/\\/".to_string(), "https:\\/\\/".to_string());

        Ok(Self {
            pattern,
            replacements,
        })
    }

    pub fn for_site(site: &SiteSettings) -> Result<Self, regex::Error> {
        Self::new(site.origin_host(), site.proxy_host.as_ref())
    }

    pub fn rewrite(&self, content: &str) -> String {
        self.pattern
            .replace_all(content, |caps: &Captures<'_>| {
                let matched = &caps[0];
                self.replacements
                    .get(matched)
                    .cloned()
                    .unwrap_or_else(|| matched.to_string())
            })
            .into_owned()
    }
}
