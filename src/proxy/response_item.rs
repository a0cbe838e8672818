//! Cached form of an origin response

use crate::cache::value::structured_cache_value;
use crate::proxy::headers::{is_hop_by_hop, CONTENT_LENGTH, CONTENT_TYPE, SET_COOKIE};
use crate::proxy::types::{ProxyError, ProxyResult};
use axum::body::Body;
use http::response::Parts;
use http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode, Version};
use serde::{Deserialize, Serialize};

/// Headers describing the body rather than the exchange
const CONTENT_HEADERS: [&str; 8] = [
    "content-type",
    "content-language",
    "content-disposition",
    "content-encoding",
    "content-location",
    "content-range",
    "expires",
    "last-modified",
];

/// An origin response captured for replay.
///
/// Exactly one of `content` (text, inlined) and `storage_key` (multimedia,
/// held in the content store) is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseCacheItem {
    pub content: Option<String>,
    pub storage_key: Option<String>,
    pub status: u16,
    pub media_type: String,
    pub protocol_version: String,
    pub headers: Vec<(String, String)>,
    pub content_headers: Vec<(String, String)>,
}

structured_cache_value!(ResponseCacheItem);

fn version_label(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

fn parse_version(label: &str) -> Version {
    match label {
        "HTTP/0.9" => Version::HTTP_09,
        "HTTP/1.0" => Version::HTTP_10,
        "HTTP/2.0" => Version::HTTP_2,
        "HTTP/3.0" => Version::HTTP_3,
        _ => Version::HTTP_11,
    }
}

fn is_content_header(name: &HeaderName) -> bool {
    CONTENT_HEADERS.contains(&name.as_str())
}

impl ResponseCacheItem {
    pub fn text(parts: &Parts, media_type: &str, content: String) -> Self {
        Self::capture(parts, media_type, Some(content), None)
    }

    pub fn stored(parts: &Parts, media_type: &str, storage_key: String) -> Self {
        Self::capture(parts, media_type, None, Some(storage_key))
    }

    fn capture(
        parts: &Parts,
        media_type: &str,
        content: Option<String>,
        storage_key: Option<String>,
    ) -> Self {
        let mut headers = Vec::new();
        let mut content_headers = Vec::new();

        for (name, value) in &parts.headers {
            if is_hop_by_hop(name) || *name == CONTENT_LENGTH || *name == SET_COOKIE {
                continue;
            }
            let Ok(value) = value.to_str() else {
                continue;
            };
            let entry = (name.as_str().to_string(), value.to_string());
            if is_content_header(name) {
                content_headers.push(entry);
            } else {
                headers.push(entry);
            }
        }

        Self {
            content,
            storage_key,
            status: parts.status.as_u16(),
            media_type: media_type.to_string(),
            protocol_version: version_label(parts.version).to_string(),
            headers,
            content_headers,
        }
    }

    /// Rebuild the response around `body`
    pub fn into_response(self, body: Body) -> ProxyResult<Response<Body>> {
        let status = StatusCode::from_u16(self.status)
            .map_err(|_| ProxyError::Internal(format!("Cached status {} is invalid", self.status)))?;

        let mut headers = HeaderMap::new();
        for (name, value) in self.headers.iter().chain(self.content_headers.iter()) {
            let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) else {
                continue;
            };
            headers.append(name, value);
        }
        if !headers.contains_key(CONTENT_TYPE) && !self.media_type.is_empty() {
            if let Ok(value) = HeaderValue::from_str(&self.media_type) {
                headers.insert(CONTENT_TYPE, value);
            }
        }

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.version_mut() = parse_version(&self.protocol_version);
        *response.headers_mut() = headers;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheValue;

    fn origin_parts() -> Parts {
        let response = Response::builder()
            .status(404)
            .version(Version::HTTP_2)
            .header("content-type", "text/html; charset=UTF-8")
            .header("content-length", "120")
            .header("set-cookie", "session=abc")
            .header("transfer-encoding", "chunked")
            .header("cache-control", "max-age=60")
            .header("link", "<https://a>; rel=preload")
            .header("link", "<https://b>; rel=preload")
            .body(())
            .unwrap();
        response.into_parts().0
    }

    #[test]
    fn test_capture_drops_transport_and_cookie_headers() {
        let item = ResponseCacheItem::text(&origin_parts(), "text/html", "body".to_string());

        let names: Vec<&str> = item
            .headers
            .iter()
            .chain(item.content_headers.iter())
            .map(|(name, _)| name.as_str())
            .collect();
        assert!(!names.contains(&"content-length"));
        assert!(!names.contains(&"set-cookie"));
        assert!(!names.contains(&"transfer-encoding"));
        assert_eq!(item.content_headers.len(), 1);
        assert_eq!(item.headers.len(), 3);
        assert_eq!(item.storage_key, None);
    }

    #[test]
    fn test_replay_restores_status_version_and_headers() {
        let item = ResponseCacheItem::stored(&origin_parts(), "text/html", "cms/abc".to_string());
        let encoded = item.encode().unwrap();
        let item = ResponseCacheItem::decode(encoded).unwrap();

        let response = item.into_response(Body::empty()).unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.version(), Version::HTTP_2);
        assert_eq!(response.headers().get_all("link").iter().count(), 2);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "text/html; charset=UTF-8"
        );
    }

    #[test]
    fn test_media_type_fills_missing_content_type() {
        let item = ResponseCacheItem {
            content: Some(String::new()),
            storage_key: None,
            status: 200,
            media_type: "image/png".to_string(),
            protocol_version: "HTTP/1.1".to_string(),
            headers: Vec::new(),
            content_headers: Vec::new(),
        };
        let response = item.into_response(Body::empty()).unwrap();
        assert_eq!(response.headers()[CONTENT_TYPE], "image/png");
    }
}
