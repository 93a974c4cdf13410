//! Offline cache controller
//!
//! Decides, for every intercepted request, whether to answer from the
//! network, a bucket, the offline page or a synthetic 503, and keeps the
//! buckets populated and pruned.

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;

use super::bucket::{Bucket, BucketSet};
use super::classify::{Route, RoutePolicy, classify};
use super::fetch::Fetcher;
use super::http::{Request, Response, ResponseSource};
use super::key::cache_key;
use super::storage::{CacheStats, CacheStore, StoredEntry};
use crate::clock::SharedClock;
use crate::config::CacheSettings;
use crate::error::{CacheError, FetchError, Result};

/// Result of precaching the static manifest
#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub cache: String,
    pub cached: Vec<String>,
}

/// Result of pruning caches from older versions
#[derive(Debug, Clone, Serialize)]
pub struct ActivateReport {
    pub kept: Vec<String>,
    pub deleted: Vec<String>,
}

/// Cache controller over an injected fetcher and cache store.
pub struct CacheController<F: Fetcher, S: CacheStore> {
    fetcher: Arc<F>,
    store: Arc<S>,
    buckets: BucketSet,
    policy: RoutePolicy,
    offline_page: String,
    precache: Vec<String>,
    clock: SharedClock,
}

impl<F: Fetcher, S: CacheStore> CacheController<F, S> {
    pub fn new(
        fetcher: Arc<F>,
        store: Arc<S>,
        settings: &CacheSettings,
        clock: SharedClock,
    ) -> Result<Self> {
        Ok(Self {
            fetcher,
            store,
            buckets: BucketSet::from_settings(settings),
            policy: RoutePolicy::from_settings(settings)?,
            offline_page: settings.offline_page.clone(),
            precache: settings.precache.clone(),
            clock,
        })
    }

    pub fn buckets(&self) -> &BucketSet {
        &self.buckets
    }

    pub fn policy(&self) -> &RoutePolicy {
        &self.policy
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn route(&self, request: &Request) -> Route {
        classify(request, &self.policy)
    }

    /// Answer an intercepted request.
    ///
    /// Only bypassed requests can return `Err`: they reach the network
    /// untouched, so a network failure surfaces to the page as-is. Every
    /// handled route ends in a response.
    pub async fn handle_fetch(&self, request: &Request) -> std::result::Result<Response, FetchError> {
        match self.route(request) {
            Route::Bypass => {
                log::debug!("Bypass: {} {}", request.method, request.url);
                self.fetcher.fetch(request).await
            }
            Route::Cached(bucket) => Ok(self.network_first(request, Some(bucket)).await),
            Route::NetworkFirst => Ok(self.network_first(request, None).await),
        }
    }

    /// Network-first with cache fallback.
    ///
    /// OK responses are written to `bucket` (when given) and returned live.
    /// Non-OK responses are returned unchanged and never cached. A network
    /// error falls back to the cache, then the offline page, then a 503.
    async fn network_first(&self, request: &Request, bucket: Option<Bucket>) -> Response {
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if let Some(bucket) = bucket
                    && response.is_ok()
                {
                    self.store_response(bucket, request, &response);
                }
                return response;
            }
            Err(e) => {
                log::debug!("Network failed for {}: {}", request.url, e);
            }
        }

        let hit = match bucket {
            Some(bucket) => self.cache_match(bucket, request),
            None => Bucket::ALL
                .iter()
                .find_map(|bucket| self.cache_match(*bucket, request)),
        };

        if let Some(response) = hit {
            log::debug!("Cache hit: {}", request.url);
            return response;
        }

        self.offline_fallback(request)
    }

    /// Look up a fresh entry in one bucket. Entries older than the bucket's
    /// max-age count as absent.
    fn cache_match(&self, bucket: Bucket, request: &Request) -> Option<Response> {
        let cache = self.buckets.name(bucket);
        let key = cache_key(&request.method, &request.url);

        let entry = match self.store.get(&cache, &key) {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("Cache read failed in {}: {}", cache, e);
                return None;
            }
        };

        if let Some(max_age) = self.buckets.max_age(bucket) {
            let age = entry.age(self.clock.now());
            if age > max_age {
                log::debug!(
                    "Stale entry in {} ({}s > {}s): {}",
                    cache,
                    age.as_secs(),
                    max_age.as_secs(),
                    request.url
                );
                return None;
            }
        }

        Some(Response {
            status: entry.status,
            headers: entry.headers,
            body: entry.body,
            source: ResponseSource::Cache,
        })
    }

    fn offline_fallback(&self, request: &Request) -> Response {
        if request.is_navigation()
            && let Ok(url) = self.policy.resolve(&self.offline_page)
        {
            let key = cache_key(&reqwest::Method::GET, &url);
            let cache = self.buckets.name(Bucket::Static);
            if let Ok(Some(entry)) = self.store.get(&cache, &key) {
                log::debug!("Serving offline page for {}", request.url);
                return Response {
                    status: entry.status,
                    headers: entry.headers,
                    body: entry.body,
                    source: ResponseSource::OfflinePage,
                };
            }
        }
        Response::service_unavailable()
    }

    /// Best-effort write; failures are logged and swallowed.
    fn store_response(&self, bucket: Bucket, request: &Request, response: &Response) {
        let cache = self.buckets.name(bucket);
        let key = cache_key(&request.method, &request.url);
        let entry = StoredEntry {
            url: request.url.to_string(),
            method: request.method.to_string(),
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            stored_at: self.clock.now(),
        };

        match self.store.put(&cache, &key, &entry) {
            Ok(()) => {}
            Err(CacheError::QuotaExceeded { .. }) => {
                self.handle_quota_exceeded();
                if bucket == Bucket::Runtime {
                    log::warn!("Dropping runtime cache write for {} after quota eviction", request.url);
                } else if let Err(e) = self.store.put(&cache, &key, &entry) {
                    log::warn!("Cache write failed in {} after eviction: {}", cache, e);
                }
            }
            Err(e) => log::warn!("Cache write failed in {}: {}", cache, e),
        }
    }

    /// Quota handler: sacrifice the runtime bucket, keep static and dynamic.
    pub fn handle_quota_exceeded(&self) -> usize {
        let cache = self.buckets.name(Bucket::Runtime);
        match self.store.delete_cache(&cache) {
            Ok(removed) => {
                log::warn!("Storage quota exceeded, evicted {} entries from {}", removed, cache);
                removed
            }
            Err(e) => {
                log::warn!("Failed to evict {}: {}", cache, e);
                0
            }
        }
    }

    /// Precache the static manifest. All-or-nothing: nothing is written
    /// unless every asset fetched OK.
    pub async fn install(&self) -> Result<InstallReport> {
        self.install_with(|_| {}).await
    }

    /// Like [`install`](Self::install), calling `on_fetched` per asset
    pub async fn install_with<P>(&self, on_fetched: P) -> Result<InstallReport>
    where
        P: Fn(&str) + Sync,
    {
        let requests = self
            .precache
            .iter()
            .map(|path| {
                let url = self.policy.resolve(path)?;
                Ok(Request::get(url.as_str())?)
            })
            .collect::<std::result::Result<Vec<_>, FetchError>>()?;

        let on_fetched = &on_fetched;
        let results = join_all(requests.iter().map(|request| async move {
            let outcome = self.fetcher.fetch(request).await;
            on_fetched(request.url.as_str());
            outcome
        }))
        .await;

        let mut responses = Vec::with_capacity(results.len());
        for (request, result) in requests.iter().zip(results) {
            match result {
                Ok(response) if response.is_ok() => responses.push((request, response)),
                Ok(response) => {
                    return Err(FetchError::Network(format!(
                        "precache of {} returned {}",
                        request.url, response.status
                    ))
                    .into());
                }
                Err(e) => {
                    return Err(FetchError::Network(format!(
                        "precache of {} failed: {}",
                        request.url, e
                    ))
                    .into());
                }
            }
        }

        let cache = self.buckets.name(Bucket::Static);
        let now = self.clock.now();
        let mut cached = Vec::with_capacity(responses.len());
        for (request, response) in responses {
            let entry = StoredEntry {
                url: request.url.to_string(),
                method: request.method.to_string(),
                status: response.status,
                headers: response.headers,
                body: response.body,
                stored_at: now,
            };
            self.store
                .put(&cache, &cache_key(&request.method, &request.url), &entry)?;
            cached.push(request.url.to_string());
        }

        log::info!("Precached {} assets into {}", cached.len(), cache);
        Ok(InstallReport { cache, cached })
    }

    /// Delete every cache that does not belong to the current version.
    pub fn activate(&self) -> Result<ActivateReport> {
        let mut kept = Vec::new();
        let mut deleted = Vec::new();
        for name in self.store.cache_names()? {
            if self.buckets.is_current(&name) {
                kept.push(name);
            } else {
                let removed = self.store.delete_cache(&name)?;
                log::info!("Deleted old cache {} ({} entries)", name, removed);
                deleted.push(name);
            }
        }
        Ok(ActivateReport { kept, deleted })
    }

    /// Remove one URL from a bucket (`CACHE_UPDATE` message)
    pub fn evict(&self, bucket: Bucket, url: &str) -> Result<bool> {
        let url = self.policy.resolve(url)?;
        let cache = self.buckets.name(bucket);
        let removed = self
            .store
            .delete(&cache, &cache_key(&reqwest::Method::GET, &url))?;
        log::debug!("Evict {} from {}: {}", url, cache, removed);
        Ok(removed)
    }

    /// Drop a whole bucket
    pub fn clear_bucket(&self, bucket: Bucket) -> Result<usize> {
        Ok(self.store.delete_cache(&self.buckets.name(bucket))?)
    }

    pub fn stats(&self) -> Result<CacheStats> {
        Ok(self.store.stats()?)
    }
}
