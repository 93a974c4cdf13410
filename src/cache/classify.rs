//! Request classification
//!
//! Pure mapping from a request to the route the controller takes. Rules are
//! evaluated in order and the first match wins.

use reqwest::{Method, Url};
use serde::Serialize;

use super::bucket::Bucket;
use super::http::Request;
use crate::config::CacheSettings;
use crate::error::{ConfigError, FetchError};

/// Path prefixes served from the static bucket
const STATIC_PREFIXES: &[&str] = &["/_next/static/", "/icons/", "/fonts/", "/images/"];

/// Exact static paths
const STATIC_PATHS: &[&str] = &["/manifest.json", "/favicon.ico"];

/// File extensions served from the static bucket
const STATIC_EXTENSIONS: &[&str] = &[
    "js", "css", "woff", "woff2", "ttf", "otf", "eot", "png", "jpg", "jpeg", "gif", "svg", "ico",
    "webp", "avif",
];

/// Page and API prefixes served from the dynamic bucket
const DYNAMIC_PREFIXES: &[&str] = &["/app", "/course", "/courses", "/api/courses", "/api/user"];

/// API prefixes served from the runtime bucket
const API_PREFIXES: &[&str] = &["/api/courses", "/api/user", "/api/progress", "/api"];

/// What the controller does with a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "route", content = "bucket", rename_all = "snake_case")]
pub enum Route {
    /// Not handled at all; goes straight to the network
    Bypass,
    /// Network-first with fallback to the given bucket
    Cached(Bucket),
    /// Network-first without writing to any bucket
    NetworkFirst,
}

/// Origin and cross-origin allow-list the classifier checks against
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    origin: Url,
    allowed_hosts: Vec<String>,
}

impl RoutePolicy {
    pub fn new(origin: Url, allowed_hosts: Vec<String>) -> Self {
        Self {
            origin,
            allowed_hosts,
        }
    }

    pub fn from_settings(settings: &CacheSettings) -> Result<Self, ConfigError> {
        let origin = Url::parse(&settings.origin)
            .map_err(|e| ConfigError::Invalid(format!("cache.origin: {}", e)))?;
        Ok(Self::new(origin, settings.allowed_hosts.clone()))
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    fn is_same_origin(&self, url: &Url) -> bool {
        url.scheme() == self.origin.scheme()
            && url.host_str() == self.origin.host_str()
            && url.port_or_known_default() == self.origin.port_or_known_default()
    }

    fn is_allowed(&self, url: &Url) -> bool {
        if self.is_same_origin(url) {
            return true;
        }
        match url.host_str() {
            Some(host) => self.allowed_hosts.iter().any(|h| h == host),
            None => false,
        }
    }

    /// Resolve a path or absolute URL against the origin
    pub fn resolve(&self, path_or_url: &str) -> Result<Url, FetchError> {
        self.origin
            .join(path_or_url)
            .map_err(|e| FetchError::InvalidRequest(format!("{}: {}", path_or_url, e)))
    }
}

/// Classify a request. First match wins:
/// non-GET, disallowed cross-origin, static, dynamic, API, everything else.
pub fn classify(request: &Request, policy: &RoutePolicy) -> Route {
    if request.method != Method::GET {
        return Route::Bypass;
    }

    if !policy.is_allowed(&request.url) {
        return Route::Bypass;
    }

    let path = request.url.path();

    if is_static(path) {
        return Route::Cached(Bucket::Static);
    }

    if !policy.is_same_origin(&request.url) {
        // Allowed third-party hosts only ever feed the static bucket
        return Route::NetworkFirst;
    }

    if matches_any_prefix(path, DYNAMIC_PREFIXES) {
        return Route::Cached(Bucket::Dynamic);
    }

    if matches_any_prefix(path, API_PREFIXES) {
        return Route::Cached(Bucket::Runtime);
    }

    Route::NetworkFirst
}

fn is_static(path: &str) -> bool {
    if STATIC_PATHS.contains(&path) {
        return true;
    }
    if STATIC_PREFIXES.iter().any(|p| path.starts_with(p)) {
        return true;
    }
    let file_name = path.rsplit_once('/').map_or(path, |(_, name)| name);
    file_name
        .rsplit_once('.')
        .filter(|(stem, _)| !stem.is_empty())
        .map(|(_, ext)| {
            STATIC_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Segment-aware prefix match: `/app` matches `/app` and `/app/x`, not `/apple`.
fn matches_any_prefix(path: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|prefix| {
        path == *prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    })
}
