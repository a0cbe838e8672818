//! Shared fakes for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use bytes::Bytes;
use cms_edge_proxy::cache::{CacheEngine, CachePolicy, InMemorySharedCache, OriginVersionSource};
use cms_edge_proxy::config::{
    CacheSettings, ClaimSettings, LocaleSettings, ProxySettings, SiteHost, SiteSettings,
};
use cms_edge_proxy::identity::{DirectoryUser, IdentityMapper, UserDirectory};
use cms_edge_proxy::origin::{ApiError, OriginTransport, TransportError};
use cms_edge_proxy::proxy::{ProxyHandler, ProxyService, SiteRegistry};
use cms_edge_proxy::storage::InMemoryContentStore;
use http::{Request, Response, StatusCode};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Origin that echoes the mapped user id into an HTML page
#[derive(Default)]
pub struct EchoOrigin {
    pub seen_user_ids: Mutex<Vec<String>>,
}

impl EchoOrigin {
    pub fn request_count(&self) -> usize {
        self.seen_user_ids.lock().len()
    }
}

#[async_trait]
impl OriginTransport for EchoOrigin {
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Body>, TransportError> {
        let user_id = request
            .headers()
            .get("x-proxy-user-id")
            .and_then(|value| value.to_str().ok())
            .unwrap_or("none")
            .to_string();
        self.seen_user_ids.lock().push(user_id.clone());

        let path = request.uri().path().to_string();
        let (content_type, body) = if path.ends_with(".css") {
            ("text/css", "body{background:url(http://origin.example/bg.png)}".to_string())
        } else {
            (
                "text/html; charset=UTF-8",
                format!("<a href=\"http://origin.example{path}\">user {user_id}</a>"),
            )
        };

        Response::builder()
            .status(StatusCode::OK)
            .header("content-type", content_type)
            .body(Body::from(body))
            .map_err(|error| TransportError::InvalidRequest(error.to_string()))
    }
}

pub struct CountingVersions {
    pub version: AtomicI64,
    pub polls: AtomicUsize,
}

impl CountingVersions {
    pub fn new(version: i64) -> Arc<Self> {
        Arc::new(Self {
            version: AtomicI64::new(version),
            polls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl OriginVersionSource for CountingVersions {
    async fn current_version(&self, _site: &SiteSettings) -> Result<i64, ApiError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(self.version.load(Ordering::SeqCst))
    }
}

pub struct Directory(pub Vec<DirectoryUser>);

#[async_trait]
impl UserDirectory for Directory {
    async fn users(&self, _site: &SiteSettings) -> Result<Vec<DirectoryUser>, ApiError> {
        Ok(self.0.clone())
    }
}

pub fn user(id: i64, login: &str, email: &str) -> DirectoryUser {
    DirectoryUser {
        id,
        login: login.to_string(),
        email: email.to_string(),
        status: 0,
        roles: serde_json::Value::Null,
    }
}

pub fn site() -> SiteSettings {
    SiteSettings {
        proxy_host: SiteHost::try_new("www.public.org").unwrap(),
        origin_address: "https://origin.example".to_string(),
        default_locale: "no".to_string(),
        auto_locale_redirect: true,
        organization: None,
    }
}

pub fn cache_settings() -> CacheSettings {
    CacheSettings {
        default_sliding_secs: 60,
        default_absolute_secs: 600,
        version_poll_interval_ms: 5_000,
        version_record_ttl_secs: 600,
        user_directory_ttl_secs: 300,
        multimedia_ttl_secs: 900,
        multimedia_buffer_max_bytes: 1024,
        multimedia_buffer_sliding_secs: 60,
        redis_url: None,
        redis_pool_size: 1,
    }
}

pub fn engine(shared: Arc<InMemorySharedCache>, versions: Arc<CountingVersions>) -> Arc<CacheEngine> {
    Arc::new(CacheEngine::new(
        shared,
        versions,
        CachePolicy::from(&cache_settings()),
    ))
}

pub struct Harness {
    pub router: axum::Router,
    pub origin: Arc<EchoOrigin>,
}

pub fn harness() -> Harness {
    let settings = cache_settings();
    let origin = Arc::new(EchoOrigin::default());
    let cache = engine(Arc::new(InMemorySharedCache::new()), CountingVersions::new(1));
    let identity = Arc::new(IdentityMapper::new(
        cache.clone(),
        Arc::new(Directory(vec![
            user(5, "alice", "alice@example.org"),
            user(7, "bob", "bob@example.org"),
        ])),
        ClaimSettings {
            subject: "sub".to_string(),
            email: "email".to_string(),
            login: "nickname".to_string(),
            organization: "organization".to_string(),
            subscriber: "is_subscriber".to_string(),
        },
        &settings,
    ));
    let proxy = ProxySettings {
        proxy_key: "secret".to_string(),
        api_namespace: "wp-json/edge-proxy/v1".to_string(),
        admin_path: "wp-admin".to_string(),
        request_timeout_secs: 5,
        max_request_size: 1024,
        max_response_size: 64 * 1024,
    };
    let handler = ProxyHandler::new(
        SiteRegistry::from_sites([site()]).unwrap(),
        cache,
        identity,
        origin.clone(),
        Arc::new(InMemoryContentStore::new()),
        proxy,
        LocaleSettings {
            cookie_names: vec!["pll_language".to_string()],
            cookie_max_age_secs: 3600,
        },
        &settings,
    );

    Harness {
        router: ProxyService::new(handler, 1024).into_router(),
        origin,
    }
}
