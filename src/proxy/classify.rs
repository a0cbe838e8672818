//! Request and response classification

use http::{Method, StatusCode};

/// File extensions served as static assets, cached once for every caller
pub const STATIC_EXTENSIONS: [&str; 9] = [
    ".js", ".css", ".png", ".gif", ".svg", ".webp", ".jpg", ".jpeg", ".woff",
];

const MULTIMEDIA_PREFIXES: [&str; 5] = ["image/", "font/", "audio/", "video/", "application/"];

/// How a response body is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFamily {
    /// Rewritten and cached inline
    Text,
    /// Cached out of core in the content store
    Multimedia,
    /// Streamed through untouched
    Other,
}

impl MediaFamily {
    /// Classify a `Content-Type` value; parameters and case are ignored
    pub fn of(content_type: &str) -> Self {
        let essence = media_type_essence(content_type);
        if essence.is_empty() {
            return Self::Other;
        }

        let texty = essence.starts_with("text/")
            || essence.ends_with("/json")
            || essence.ends_with("+json")
            || essence.ends_with("/xml")
            || essence.ends_with("+xml");
        if texty && !essence.contains("image") {
            return Self::Text;
        }

        if MULTIMEDIA_PREFIXES
            .iter()
            .any(|prefix| essence.starts_with(prefix))
        {
            Self::Multimedia
        } else {
            Self::Other
        }
    }
}

/// `text/html; charset=utf-8` becomes `text/html`
pub fn media_type_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

pub fn is_static_asset(path: &str) -> bool {
    let path = path.to_ascii_lowercase();
    STATIC_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Statuses whose responses may be cached: success, and client errors up to
/// and including 500
pub fn is_status_cacheable(status: StatusCode) -> bool {
    status.is_success() || (400..=500).contains(&status.as_u16())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestClass {
    pub cacheable: bool,
    pub is_static: bool,
}

impl RequestClass {
    pub fn classify(method: &Method, absolute_url: &str, path: &str, admin_path: &str) -> Self {
        let in_admin = !admin_path.is_empty() && absolute_url.contains(admin_path);
        Self {
            cacheable: *method == Method::GET && !in_admin,
            is_static: is_static_asset(path),
        }
    }

    /// Cacheable content that varies by caller
    pub fn is_dynamic_cacheable(&self) -> bool {
        self.cacheable && !self.is_static
    }
}
