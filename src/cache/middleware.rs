//! Response cache middleware.
//!
//! Serves cached `{status, headers, body}` triples for cacheable requests and
//! captures successful responses on a miss. Any failure in the cache layer is
//! logged and the live response is served instead.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes, HttpBody},
    extract::State,
    http::{
        HeaderName, HeaderValue, Method, Request, StatusCode,
        header::{CONTENT_TYPE, SET_COOKIE},
        response::Parts,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::BodyExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::backend::BackendError;
use super::deps;
use super::keys::hash_value;
use super::service::{Cache, CacheOptions};

pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");
pub const X_CACHE_KEY: HeaderName = HeaderName::from_static("x-cache-key");

const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

pub type KeyGenerator = Arc<dyn Fn(&Request<Body>) -> String + Send + Sync>;
pub type SkipPredicate = Arc<dyn Fn(&Request<Body>) -> bool + Send + Sync>;

/// What the middleware caches and under which key and tags.
#[derive(Clone)]
pub struct ResponseCachePolicy {
    /// Entry lifetime; the cache default when `None`.
    pub ttl: Option<Duration>,
    pub tags: HashSet<String>,
    /// Replaces [`default_cache_key`] when set.
    pub key_generator: Option<KeyGenerator>,
    pub skip_cache: SkipPredicate,
    /// Request headers whose values are folded into the default key.
    pub vary_by: Vec<HeaderName>,
    pub max_body_bytes: usize,
}

impl ResponseCachePolicy {
    pub fn new() -> Self {
        Self {
            ttl: None,
            tags: HashSet::new(),
            key_generator: None,
            skip_cache: Arc::new(skip_unless_get_or_head),
            vary_by: Vec::new(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_key_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(&Request<Body>) -> String + Send + Sync + 'static,
    {
        self.key_generator = Some(Arc::new(generator));
        self
    }

    pub fn with_skip<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Request<Body>) -> bool + Send + Sync + 'static,
    {
        self.skip_cache = Arc::new(predicate);
        self
    }

    pub fn vary_by(mut self, header: HeaderName) -> Self {
        self.vary_by.push(header);
        self
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    fn key_for(&self, request: &Request<Body>) -> String {
        match &self.key_generator {
            Some(generator) => generator(request),
            None => default_cache_key(request, &self.vary_by),
        }
    }

    fn options(&self, recorded: HashSet<String>) -> CacheOptions {
        let mut options = CacheOptions::new()
            .with_tags(self.tags.iter().cloned())
            .with_tags(recorded);
        options.ttl = self.ttl;
        options
    }
}

impl Default for ResponseCachePolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResponseCachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCachePolicy")
            .field("ttl", &self.ttl)
            .field("tags", &self.tags)
            .field("custom_key", &self.key_generator.is_some())
            .field("vary_by", &self.vary_by)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish_non_exhaustive()
    }
}

/// Shared state for [`response_cache_layer`].
#[derive(Clone)]
pub struct ResponseCacheState {
    pub cache: Arc<Cache>,
    pub policy: Arc<ResponseCachePolicy>,
}

impl ResponseCacheState {
    pub fn new(cache: Arc<Cache>, policy: ResponseCachePolicy) -> Self {
        Self {
            cache,
            policy: Arc::new(policy),
        }
    }
}

/// Captured response as stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl CachedResponse {
    fn into_response(self, key: &str) -> Result<Response, axum::http::Error> {
        let mut builder = Response::builder().status(self.status);
        for (name, value) in self.headers {
            builder = builder.header(name, value);
        }
        let response = builder.body(Body::from(self.body))?;
        Ok(mark(response, "HIT", key))
    }
}

/// Middleware caching responses under [`ResponseCachePolicy`].
///
/// Tags of the stored response are the policy's tags plus any the handler
/// recorded through [`deps::record`].
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(state): State<ResponseCacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let policy = state.policy.as_ref();
    if !state.cache.is_enabled() || (policy.skip_cache)(&request) {
        return next.run(request).await;
    }

    let key = policy.key_for(&request);

    if let Some(cached) = state.cache.get::<CachedResponse>(&key).await {
        match cached.into_response(&key) {
            Ok(response) => {
                debug!(cache = "response", outcome = "hit", key = %key, "serving cached response");
                return response;
            }
            Err(err) => {
                warn!(
                    cache = "response",
                    key = %key,
                    error = %err,
                    "cached response could not be rebuilt; serving live"
                );
            }
        }
    }

    debug!(cache = "response", outcome = "miss", key = %key, "executing handler");
    let (response, recorded) = deps::with_collector(next.run(request)).await;

    if !should_store_response(&response) {
        return mark(response, "MISS", &key);
    }

    let (parts, body) = response.into_parts();
    let limit = policy.max_body_bytes;
    if body
        .size_hint()
        .upper()
        .is_some_and(|upper| upper > limit as u64)
    {
        state.cache.absorb(
            "response_cache",
            &key,
            &BackendError::serialization(format!("body exceeds {limit} bytes")),
        );
        return mark(Response::from_parts(parts, body), "MISS", &key);
    }

    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            warn!(cache = "response", key = %key, error = %err, "failed to read response body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match capture(&parts, &bytes, limit) {
        Ok(cached) => {
            debug!(
                cache = "response",
                key = %key,
                recorded_tags = recorded.len(),
                "caching response"
            );
            state
                .cache
                .set(&key, &cached, policy.options(recorded))
                .await;
        }
        Err(err) => state.cache.absorb("response_cache", &key, &err),
    }

    mark(Response::from_parts(parts, Body::from(bytes)), "MISS", &key)
}

/// `path?sorted-query`, followed by `|name=value` for each vary header.
///
/// Requests other than GET are prefixed with their method so a HEAD response
/// never answers a GET.
pub fn default_cache_key(request: &Request<Body>, vary_by: &[HeaderName]) -> String {
    let uri = request.uri();
    let mut key = String::new();
    if request.method() != Method::GET {
        key.push_str(request.method().as_str());
        key.push(' ');
    }
    key.push_str(uri.path());

    if let Some(query) = uri.query().filter(|query| !query.is_empty()) {
        let mut pairs: Vec<&str> = query.split('&').filter(|pair| !pair.is_empty()).collect();
        pairs.sort_unstable();
        if !pairs.is_empty() {
            key.push('?');
            key.push_str(&pairs.join("&"));
        }
    }

    for name in vary_by {
        let value = request
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");
        key.push('|');
        key.push_str(name.as_str());
        key.push('=');
        key.push_str(value);
    }
    key
}

fn skip_unless_get_or_head(request: &Request<Body>) -> bool {
    !matches!(*request.method(), Method::GET | Method::HEAD)
}

/// 2xx, no `Set-Cookie`, not a server-sent event stream.
pub fn should_store_response(response: &Response) -> bool {
    if !response.status().is_success() || response.headers().contains_key(SET_COOKIE) {
        return false;
    }
    !response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/event-stream"))
}

fn capture(parts: &Parts, bytes: &Bytes, limit: usize) -> Result<CachedResponse, BackendError> {
    if bytes.len() > limit {
        return Err(BackendError::serialization(format!(
            "body of {} bytes exceeds {limit} bytes",
            bytes.len()
        )));
    }
    let body = std::str::from_utf8(bytes)
        .map_err(BackendError::serialization)?
        .to_owned();
    let headers = parts
        .headers
        .iter()
        .filter(|(name, _)| **name != X_CACHE && **name != X_CACHE_KEY)
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.to_string(), value.to_string()))
        })
        .collect();
    Ok(CachedResponse {
        status: parts.status.as_u16(),
        headers,
        body,
    })
}

fn mark(mut response: Response, outcome: &'static str, key: &str) -> Response {
    let headers = response.headers_mut();
    headers.insert(X_CACHE, HeaderValue::from_static(outcome));
    headers.insert(X_CACHE_KEY, key_header(key));
    response
}

/// Keys that are not valid header text are reported by their hash.
fn key_header(key: &str) -> HeaderValue {
    match HeaderValue::from_str(key) {
        Ok(value) if !key.is_empty() => value,
        _ => HeaderValue::from_str(&format!("{:016x}", hash_value(key)))
            .unwrap_or_else(|_| HeaderValue::from_static("-")),
    }
}
