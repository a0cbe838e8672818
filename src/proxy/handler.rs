//! The proxying content handler
//!
//! Every request flows through [`ProxyHandler::handle`]:
//!
//! 1. the Host header selects the site, double slashes are redirected away
//! 2. token scripts and logout are answered locally
//! 3. the site root may redirect to the caller's preferred locale
//! 4. the caller is mapped to an origin user, which partitions the cache key
//! 5. cacheable requests are served from cache when possible
//! 6. everything else is forwarded to the origin and transformed by media
//!    family: text is rewritten and cached inline, multimedia is cached in
//!    the content store, anything else streams through

use crate::cache::{CacheEngine, EntryOptions, UNVERSIONED};
use crate::config::{CacheSettings, LocaleSettings, ProxySettings};
use crate::identity::{IdentityMapper, OriginUserId, Principal};
use crate::origin::OriginTransport;
use crate::proxy::body::{buffer_up_to, declared_length, Buffered};
use crate::proxy::classify::{is_status_cacheable, MediaFamily, RequestClass};
use crate::proxy::headers::{
    paths, strip_hop_by_hop, ACCEPT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HOST,
    LOCATION, REFERER, SET_COOKIE, X_PROXY_KEY, X_PROXY_USER_ID,
};
use crate::proxy::locale::{auto_redirect_target, locale_cookies};
use crate::proxy::response_item::ResponseCacheItem;
use crate::proxy::site::{SiteContext, SiteRegistry};
use crate::proxy::types::{CacheKey, ProxyError, ProxyResult};
use crate::storage::{ContentStore, StorageError};
use axum::body::Body;
use bytes::Bytes;
use http::header::CACHE_CONTROL;
use http::response::Parts;
use http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode, Uri};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// How a forwarded response may be cached
#[derive(Debug, Clone)]
struct CacheTicket {
    key: CacheKey,
    origin_version: i64,
}

pub struct ProxyHandler {
    sites: SiteRegistry,
    cache: Arc<CacheEngine>,
    identity: Arc<IdentityMapper>,
    transport: Arc<dyn OriginTransport>,
    store: Arc<dyn ContentStore>,
    proxy: ProxySettings,
    locale: LocaleSettings,
    multimedia_options: EntryOptions,
}

impl ProxyHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sites: SiteRegistry,
        cache: Arc<CacheEngine>,
        identity: Arc<IdentityMapper>,
        transport: Arc<dyn OriginTransport>,
        store: Arc<dyn ContentStore>,
        proxy: ProxySettings,
        locale: LocaleSettings,
        cache_settings: &CacheSettings,
    ) -> Self {
        Self {
            sites,
            cache,
            identity,
            transport,
            store,
            proxy,
            locale,
            multimedia_options: EntryOptions::absolute(cache_settings.multimedia_ttl()),
        }
    }

    #[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
    pub async fn handle(&self, request: Request<Body>) -> ProxyResult<Response<Body>> {
        let host = request_host(&request).unwrap_or_default();
        let context = self
            .sites
            .resolve(&host)
            .ok_or_else(|| ProxyError::UnknownSite(host.clone()))?;
        let site = &context.site;

        if let Some(target) = collapse_slashes(request.uri()) {
            let method = request.method();
            let status = if *method == Method::GET || *method == Method::HEAD {
                StatusCode::MOVED_PERMANENTLY
            } else {
                StatusCode::PERMANENT_REDIRECT
            };
            return redirect(status, &target);
        }

        let principal = request.extensions().get::<Principal>().cloned();
        if let Some(response) = intercept(&request, principal.as_ref())? {
            return Ok(response);
        }

        if let Some(target) =
            auto_redirect_target(site, &self.locale, request.uri(), request.headers())
        {
            debug!(target = %target, "Redirecting to preferred locale");
            return redirect(StatusCode::FOUND, &target);
        }

        let user_id = self
            .identity
            .map_to_origin_user(site, principal.as_ref())
            .await?;

        let path_and_query = request
            .uri()
            .path_and_query()
            .map_or("/", |value| value.as_str())
            .to_string();
        let origin_url = format!("{}{}", site.origin_address(), path_and_query);
        let class = RequestClass::classify(
            request.method(),
            &origin_url,
            request.uri().path(),
            &self.proxy.admin_path,
        );

        let cookies = if class.is_dynamic_cacheable() {
            locale_cookies(site, &self.locale, request.uri().path(), request.headers())
        } else {
            Vec::new()
        };

        let ticket = if class.cacheable {
            let key = if class.is_static {
                CacheKey::derive(&origin_url, 0)
            } else {
                CacheKey::derive(&origin_url, user_id)
            };

            if let Some(response) = self.from_cache(context, &key, !class.is_static).await? {
                debug!(key = %key, "Served from cache");
                return Ok(with_cookies(response, cookies));
            }

            let origin_version = if class.is_static {
                UNVERSIONED
            } else {
                self.cache.origin_version(site).await?
            };
            Some(CacheTicket {
                key,
                origin_version,
            })
        } else {
            None
        };

        let response = self
            .forward(context, request, user_id, &origin_url, &path_and_query, ticket)
            .await?;
        Ok(with_cookies(response, cookies))
    }

    async fn from_cache(
        &self,
        context: &SiteContext,
        key: &CacheKey,
        versioned: bool,
    ) -> ProxyResult<Option<Response<Body>>> {
        let Some(item) = self
            .cache
            .get::<ResponseCacheItem>(&context.site, key.as_str(), versioned)
            .await?
        else {
            return Ok(None);
        };
        self.materialize(item).await
    }

    /// Rebuild a cached response; a blob missing from the store is a miss
    async fn materialize(&self, mut item: ResponseCacheItem) -> ProxyResult<Option<Response<Body>>> {
        let body = match (item.content.take(), item.storage_key.as_deref()) {
            (Some(content), _) => Body::from(content),
            (None, Some(storage_key)) => match self.store.read(storage_key).await {
                Ok(bytes) => Body::from(bytes),
                Err(StorageError::NotFound(_)) => {
                    debug!(storage_key = %storage_key, "Cached blob is gone, treating as miss");
                    return Ok(None);
                }
                Err(error) => {
                    warn!(storage_key = %storage_key, error = %error, "Cached blob unreadable, treating as miss");
                    return Ok(None);
                }
            },
            (None, None) => return Ok(None),
        };
        item.into_response(body).map(Some)
    }

    async fn forward(
        &self,
        context: &SiteContext,
        request: Request<Body>,
        user_id: OriginUserId,
        origin_url: &str,
        path_and_query: &str,
        ticket: Option<CacheTicket>,
    ) -> ProxyResult<Response<Body>> {
        let site = &context.site;
        let (parts, body) = request.into_parts();

        let max_request_size = self.proxy.max_request_size;
        let body = Limited::new(body, max_request_size)
            .collect()
            .await
            .map_err(|error| {
                if error.is::<LengthLimitError>() {
                    ProxyError::RequestTooLarge {
                        max_size: max_request_size,
                    }
                } else {
                    ProxyError::InvalidRequest(format!("Body collection error: {error}"))
                }
            })?
            .to_bytes();

        let uri: Uri = origin_url
            .parse()
            .map_err(|error| ProxyError::InvalidRequest(format!("Invalid origin URL: {error}")))?;

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(ACCEPT_ENCODING);
        headers.remove(CONTENT_LENGTH);
        if ticket.is_some() {
            headers.remove(COOKIE);
        }
        headers.insert(HOST, header_value(site.origin_host())?);
        headers.insert(X_PROXY_USER_ID, HeaderValue::from(user_id.into_inner()));
        headers.insert(X_PROXY_KEY, header_value(&self.proxy.proxy_key)?);

        let mut outgoing = Request::new(body);
        *outgoing.method_mut() = parts.method;
        *outgoing.uri_mut() = uri;
        *outgoing.headers_mut() = headers;

        let timeout = self.proxy.request_timeout();
        let response = tokio::time::timeout(timeout, self.transport.send(outgoing))
            .await
            .map_err(|_| ProxyError::OriginTimeout(timeout))??;

        let (mut parts, body) = response.into_parts();

        if parts.status == StatusCode::UNAUTHORIZED {
            let return_url = format!("{}{}", site.proxy_address(), path_and_query);
            let target = format!(
                "{}?returnUrl={}",
                paths::LOGIN,
                urlencoding::encode(&return_url)
            );
            return redirect(StatusCode::FOUND, &target);
        }

        strip_hop_by_hop(&mut parts.headers);
        if ticket.is_some() {
            parts.headers.remove(SET_COOKIE);
        }
        let location = parts
            .headers
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(|value| context.rewriter.rewrite(value));
        if let Some(location) = location {
            parts.headers.insert(LOCATION, header_value(&location)?);
        }

        let content_type = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let ticket = ticket.filter(|_| is_status_cacheable(parts.status));

        match MediaFamily::of(&content_type) {
            MediaFamily::Text => {
                self.transform_text(context, parts, body, &content_type, ticket)
                    .await
            }
            MediaFamily::Multimedia => match ticket {
                Some(ticket) => {
                    self.store_multimedia(context, parts, body, &content_type, ticket)
                        .await
                }
                None => Ok(Response::from_parts(parts, body)),
            },
            MediaFamily::Other => Ok(Response::from_parts(parts, body)),
        }
    }

    async fn collect_response(&self, body: Body) -> ProxyResult<Bytes> {
        let max_response_size = self.proxy.max_response_size;
        Limited::new(body, max_response_size)
            .collect()
            .await
            .map(|collected| collected.to_bytes())
            .map_err(|error| {
                if error.is::<LengthLimitError>() {
                    ProxyError::ResponseTooLarge {
                        max_size: max_response_size,
                    }
                } else {
                    ProxyError::OriginUnavailable(format!("Response body error: {error}"))
                }
            })
    }

    async fn transform_text(
        &self,
        context: &SiteContext,
        mut parts: Parts,
        body: Body,
        content_type: &str,
        ticket: Option<CacheTicket>,
    ) -> ProxyResult<Response<Body>> {
        let bytes = self.collect_response(body).await?;
        let Ok(text) = std::str::from_utf8(&bytes) else {
            debug!(content_type = %content_type, "Text body is not UTF-8, passing through");
            return Ok(Response::from_parts(parts, Body::from(bytes)));
        };

        let content = context.rewriter.rewrite(text);
        parts.headers.remove(CONTENT_LENGTH);

        if let Some(ticket) = ticket {
            let item = ResponseCacheItem::text(&parts, content_type, content.clone());
            self.cache
                .set(
                    ticket.key.as_str(),
                    item,
                    ticket.origin_version,
                    self.cache.default_options(),
                )
                .await;
            debug!(key = %ticket.key, status = parts.status.as_u16(), "Cached text response");
        }

        Ok(Response::from_parts(parts, Body::from(content)))
    }

    async fn store_multimedia(
        &self,
        context: &SiteContext,
        mut parts: Parts,
        body: Body,
        content_type: &str,
        ticket: CacheTicket,
    ) -> ProxyResult<Response<Body>> {
        let limit = self.proxy.max_response_size;
        if declared_length(&parts.headers).is_some_and(|length| length > limit as u64) {
            debug!(key = %ticket.key, "Multimedia response exceeds the size limit, streaming uncached");
            return Ok(Response::from_parts(parts, body));
        }

        let bytes = match buffer_up_to(body, limit).await {
            Ok(Buffered::Complete(bytes)) => bytes,
            Ok(Buffered::TooLarge(body)) => {
                debug!(key = %ticket.key, "Multimedia response exceeds the size limit, streaming uncached");
                return Ok(Response::from_parts(parts, body));
            }
            Err(error) => {
                return Err(ProxyError::OriginUnavailable(format!(
                    "Response body error: {error}"
                )))
            }
        };
        parts.headers.remove(CONTENT_LENGTH);

        let storage_key = storage_key(context.site.origin_host(), &ticket.key, &bytes);
        match self.store.write(&storage_key, bytes.clone()).await {
            Ok(()) => {
                let item = ResponseCacheItem::stored(&parts, content_type, storage_key);
                self.cache
                    .set(
                        ticket.key.as_str(),
                        item,
                        ticket.origin_version,
                        self.multimedia_options,
                    )
                    .await;
                debug!(key = %ticket.key, size = bytes.len(), "Cached multimedia response");
            }
            Err(error) => {
                warn!(storage_key = %storage_key, error = %error, "Content store write failed, response not cached");
            }
        }

        Ok(Response::from_parts(parts, Body::from(bytes)))
    }
}

/// Blob name for a multimedia body; the content digest makes every distinct
/// body a new blob, so write-once stores never keep serving replaced content
fn storage_key(origin_host: &str, key: &CacheKey, content: &[u8]) -> String {
    format!("{origin_host}/{key}/{}", hex::encode(Sha256::digest(content)))
}

fn request_host(request: &Request<Body>) -> Option<String> {
    request
        .headers()
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|authority| authority.to_string()))
}

/// Path with repeated slashes collapsed, when the request path has any
fn collapse_slashes(uri: &Uri) -> Option<String> {
    let path = uri.path();
    if !path.contains("//") {
        return None;
    }

    let mut collapsed = String::with_capacity(path.len());
    for c in path.chars() {
        if c == '/' && collapsed.ends_with('/') {
            continue;
        }
        collapsed.push(c);
    }
    if let Some(query) = uri.query() {
        collapsed.push('?');
        collapsed.push_str(query);
    }
    Some(collapsed)
}

/// Requests answered without contacting the origin
fn intercept(
    request: &Request<Body>,
    principal: Option<&Principal>,
) -> ProxyResult<Option<Response<Body>>> {
    let path = request.uri().path();

    if path.contains(paths::ACCESS_TOKEN_SCRIPT) {
        let token = principal.and_then(|principal| principal.access_token.clone());
        return token_response(token, "access token").map(Some);
    }

    if path.contains(paths::ID_TOKEN_SCRIPT) {
        let token = principal.and_then(|principal| principal.id_token.clone());
        return token_response(token, "id token").map(Some);
    }

    if path.contains(paths::LOGIN_SCRIPT) && is_logout(request.uri().query()) {
        let return_url = request
            .headers()
            .get(REFERER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .unwrap_or("/");
        let target = format!(
            "{}?returnUrl={}",
            paths::LOGOUT,
            urlencoding::encode(return_url)
        );
        return redirect(StatusCode::FOUND, &target).map(Some);
    }

    Ok(None)
}

fn is_logout(query: Option<&str>) -> bool {
    query
        .unwrap_or_default()
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .any(|(key, value)| key == "action" && value == "logout")
}

fn token_response(token: Option<String>, kind: &'static str) -> ProxyResult<Response<Body>> {
    let token = token
        .filter(|token| !token.is_empty())
        .ok_or(ProxyError::MissingToken(kind))?;
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(CACHE_CONTROL, "no-store")
        .body(Body::from(token))?)
}

fn redirect(status: StatusCode, location: &str) -> ProxyResult<Response<Body>> {
    Ok(Response::builder()
        .status(status)
        .header(LOCATION, header_value(location)?)
        .body(Body::empty())?)
}

fn header_value(value: &str) -> ProxyResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| ProxyError::Internal(format!("'{value}' is not a valid header value")))
}

fn with_cookies(mut response: Response<Body>, cookies: Vec<HeaderValue>) -> Response<Body> {
    let headers: &mut HeaderMap = response.headers_mut();
    for cookie in cookies {
        headers.append(SET_COOKIE, cookie);
    }
    response
}
