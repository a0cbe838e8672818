//! Locale redirect and locale cookie handling

use crate::config::{LocaleSettings, SiteSettings};
use crate::proxy::headers::{COOKIE, REFERER};
use http::{HeaderMap, HeaderValue, Uri};

/// Locale code of the first path segment, e.g. `en` in `/en/about/`.
///
/// Accepts two letter codes with an optional two letter region (`pt-br`).
pub fn locale_segment(path: &str) -> Option<&str> {
    let segment = path.trim_start_matches('/').split('/').next()?;
    let mut pieces = segment.split('-');
    let language = pieces.next()?;
    let region = pieces.next();
    let is_code = |code: &str| code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic());

    let valid = is_code(language) && region.is_none_or(is_code) && pieces.next().is_none();
    valid.then_some(segment)
}

/// Values of the named cookies in the `Cookie` headers, in header order
pub fn cookie_values<'a>(headers: &'a HeaderMap, name: &'a str) -> impl Iterator<Item = &'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(move |pair| {
            let (key, value) = pair.split_once('=')?;
            (key.trim() == name).then_some(value.trim())
        })
}

/// Target of the automatic locale redirect for a request to the site root
pub fn auto_redirect_target(
    site: &SiteSettings,
    locale: &LocaleSettings,
    uri: &Uri,
    headers: &HeaderMap,
) -> Option<String> {
    if !site.auto_locale_redirect || uri.path() != "/" {
        return None;
    }

    let preferred = locale
        .cookie_names
        .iter()
        .flat_map(|name| cookie_values(headers, name))
        .find(|value| !value.is_empty())?;

    if preferred.eq_ignore_ascii_case(&site.default_locale) || locale_segment(preferred) != Some(preferred) {
        return None;
    }

    let preferred = preferred.to_ascii_lowercase();
    Some(match uri.query() {
        Some(query) => format!("/{preferred}/?{query}"),
        None => format!("/{preferred}/"),
    })
}

/// `Set-Cookie` values to send when a page is reached from a page in another
/// locale; empty when no referer is present or the locales agree
pub fn locale_cookies(
    site: &SiteSettings,
    locale: &LocaleSettings,
    request_path: &str,
    headers: &HeaderMap,
) -> Vec<HeaderValue> {
    let Some(referer) = headers
        .get(REFERER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<Uri>().ok())
    else {
        return Vec::new();
    };

    let requested = locale_segment(request_path).unwrap_or(site.default_locale.as_str());
    let referred = locale_segment(referer.path()).unwrap_or(site.default_locale.as_str());
    if requested.eq_ignore_ascii_case(referred) {
        return Vec::new();
    }

    let requested = requested.to_ascii_lowercase();
    locale
        .cookie_names
        .iter()
        .filter_map(|name| {
            HeaderValue::from_str(&format!(
                "{name}={requested}; Path=/; Max-Age={}; Secure; SameSite=Lax",
                locale.cookie_max_age_secs
            ))
            .ok()
        })
        .collect()
}
