//! Test utilities for proxy module testing
//!
//! A scripted origin, fixed origin versions and a static user directory,
//! wired into a [`ProxyHandler`] for the `www.public.org` -> `origin.example`
//! site.

use crate::cache::{CacheEngine, CachePolicy, InMemorySharedCache, OriginVersionSource};
use crate::config::{CacheSettings, ClaimSettings, LocaleSettings, ProxySettings, SiteHost, SiteSettings};
use crate::identity::{DirectoryUser, IdentityMapper, UserDirectory};
use crate::origin::{ApiError, OriginTransport, TransportError};
use crate::proxy::handler::ProxyHandler;
use crate::proxy::headers::HOST;
use crate::proxy::site::SiteRegistry;
use crate::storage::InMemoryContentStore;
use async_trait::async_trait;
use axum::body::Body;
use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Route {
    Respond {
        status: StatusCode,
        headers: Vec<(String, String)>,
        body: String,
    },
    Hang,
}

/// Origin answering from a fixed routing table keyed by path; unrouted
/// paths fail like a refused connection
#[derive(Default)]
pub struct FakeOrigin {
    routes: Mutex<HashMap<String, Route>>,
    requests: Mutex<Vec<Request<Bytes>>>,
}

pub struct RouteBuilder<'a> {
    origin: &'a FakeOrigin,
    path: String,
}

impl RouteBuilder<'_> {
    pub fn with_header(self, name: &str, value: &str) -> Self {
        if let Some(Route::Respond { headers, .. }) = self.origin.routes.lock().get_mut(&self.path) {
            headers.push((name.to_string(), value.to_string()));
        }
        self
    }
}

impl FakeOrigin {
    pub fn respond(
        &self,
        path: &str,
        status: StatusCode,
        content_type: &str,
        body: &str,
    ) -> RouteBuilder<'_> {
        self.routes.lock().insert(
            path.to_string(),
            Route::Respond {
                status,
                headers: vec![("content-type".to_string(), content_type.to_string())],
                body: body.to_string(),
            },
        );
        RouteBuilder {
            origin: self,
            path: path.to_string(),
        }
    }

    pub fn hang(&self, path: &str) {
        self.routes.lock().insert(path.to_string(), Route::Hang);
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn last_request(&self) -> Option<Request<Bytes>> {
        self.requests.lock().last().map(|request| {
            let mut copy = Request::new(request.body().clone());
            *copy.method_mut() = request.method().clone();
            *copy.uri_mut() = request.uri().clone();
            *copy.headers_mut() = request.headers().clone();
            copy
        })
    }
}

#[async_trait]
impl OriginTransport for FakeOrigin {
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Body>, TransportError> {
        let route = self.routes.lock().get(request.uri().path()).cloned();
        self.requests.lock().push(request);

        match route {
            Some(Route::Respond {
                status,
                headers,
                body,
            }) => {
                let mut response = Response::new(Body::from(body));
                *response.status_mut() = status;
                for (name, value) in headers {
                    let name = http::HeaderName::from_bytes(name.as_bytes())
                        .map_err(|error| TransportError::InvalidRequest(error.to_string()))?;
                    let value = http::HeaderValue::from_str(&value)
                        .map_err(|error| TransportError::InvalidRequest(error.to_string()))?;
                    response.headers_mut().append(name, value);
                }
                Ok(response)
            }
            Some(Route::Hang) => std::future::pending().await,
            None => Err(TransportError::Connection("connection refused".to_string())),
        }
    }
}

pub struct FixedVersions {
    version: AtomicI64,
}

impl FixedVersions {
    pub fn set(&self, version: i64) {
        self.version.store(version, Ordering::SeqCst);
    }
}

#[async_trait]
impl OriginVersionSource for FixedVersions {
    async fn current_version(&self, _site: &SiteSettings) -> Result<i64, ApiError> {
        Ok(self.version.load(Ordering::SeqCst))
    }
}

pub struct StaticDirectory(pub Vec<DirectoryUser>);

#[async_trait]
impl UserDirectory for StaticDirectory {
    async fn users(&self, _site: &SiteSettings) -> Result<Vec<DirectoryUser>, ApiError> {
        Ok(self.0.clone())
    }
}

pub fn directory_user(id: i64, login: &str, email: &str) -> DirectoryUser {
    DirectoryUser {
        id,
        login: login.to_string(),
        email: email.to_string(),
        status: 0,
        roles: serde_json::Value::Null,
    }
}

pub fn test_site() -> SiteSettings {
    SiteSettings {
        proxy_host: SiteHost::try_new("www.public.org").unwrap(),
        origin_address: "https://origin.example".to_string(),
        default_locale: "no".to_string(),
        auto_locale_redirect: true,
        organization: Some("acme".to_string()),
    }
}

pub fn test_proxy_settings() -> ProxySettings {
    ProxySettings {
        proxy_key: "proxy-secret".to_string(),
        api_namespace: "wp-json/edge-proxy/v1".to_string(),
        admin_path: "wp-admin".to_string(),
        request_timeout_secs: 1,
        max_request_size: 1024,
        max_response_size: 64 * 1024,
    }
}

pub fn test_cache_settings() -> CacheSettings {
    CacheSettings {
        default_sliding_secs: 60,
        default_absolute_secs: 600,
        version_poll_interval_ms: 20,
        version_record_ttl_secs: 600,
        user_directory_ttl_secs: 300,
        multimedia_ttl_secs: 900,
        multimedia_buffer_max_bytes: 1024,
        multimedia_buffer_sliding_secs: 60,
        redis_url: None,
        redis_pool_size: 1,
    }
}

pub fn test_claims() -> ClaimSettings {
    ClaimSettings {
        subject: "sub".to_string(),
        email: "email".to_string(),
        login: "nickname".to_string(),
        organization: "organization".to_string(),
        subscriber: "is_subscriber".to_string(),
    }
}

pub fn test_locale() -> LocaleSettings {
    LocaleSettings {
        cookie_names: vec!["pll_language".to_string()],
        cookie_max_age_secs: 3600,
    }
}

/// A handler wired to in-memory collaborators
pub struct TestProxy {
    pub handler: ProxyHandler,
    pub origin: Arc<FakeOrigin>,
    pub store: Arc<InMemoryContentStore>,
    pub versions: Arc<FixedVersions>,
    pub cache: Arc<CacheEngine>,
}

impl TestProxy {
    pub fn new() -> Self {
        Self::with_users(vec![
            directory_user(5, "alice", "alice@example.org"),
            directory_user(7, "bob", "bob@example.org"),
        ])
    }

    pub fn with_users(users: Vec<DirectoryUser>) -> Self {
        let settings = test_cache_settings();
        let origin = Arc::new(FakeOrigin::default());
        let store = Arc::new(InMemoryContentStore::new());
        let versions = Arc::new(FixedVersions {
            version: AtomicI64::new(1),
        });
        let cache = Arc::new(CacheEngine::new(
            Arc::new(InMemorySharedCache::new()),
            versions.clone(),
            CachePolicy::from(&settings),
        ));
        let identity = Arc::new(IdentityMapper::new(
            cache.clone(),
            Arc::new(StaticDirectory(users)),
            test_claims(),
            &settings,
        ));
        let handler = ProxyHandler::new(
            SiteRegistry::from_sites([test_site()]).unwrap(),
            cache.clone(),
            identity,
            origin.clone(),
            store.clone(),
            test_proxy_settings(),
            test_locale(),
            &settings,
        );

        Self {
            handler,
            origin,
            store,
            versions,
            cache,
        }
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(HOST, "www.public.org")
        .body(Body::empty())
        .unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}
