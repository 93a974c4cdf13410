//! Cache bucket, route and sync-queue display models

use serde::Serialize;
use tabled::Tabled;

use super::common::truncate_string;
use crate::cache::{BucketSet, CacheNameStats, PendingAction, Request, Route};
use crate::output::formatters::{format_size, format_timestamp_local};

const URL_WIDTH: usize = 60;

/// One cache namespace in `cache status`
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct BucketDisplay {
    #[tabled(rename = "CACHE")]
    pub name: String,

    /// `current` for this version's buckets, `stale` until the next activate
    #[tabled(rename = "STATUS")]
    pub status: String,

    #[tabled(rename = "ENTRIES")]
    pub entries: usize,

    #[tabled(rename = "SIZE")]
    pub size: String,

    #[tabled(rename = "NEWEST")]
    pub newest: String,
}

impl BucketDisplay {
    pub fn new(stats: &CacheNameStats, buckets: &BucketSet) -> Self {
        let status = if buckets.is_current(&stats.name) {
            "current"
        } else {
            "stale"
        };
        Self {
            name: stats.name.clone(),
            status: status.to_string(),
            entries: stats.entries,
            size: format_size(stats.size_bytes),
            newest: format_timestamp_local(stats.newest_entry.as_ref()),
        }
    }
}

/// Result of `cache classify`
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct RouteDisplay {
    #[tabled(rename = "METHOD")]
    pub method: String,

    #[tabled(rename = "URL")]
    pub url: String,

    #[tabled(rename = "ROUTE")]
    pub route: String,

    /// Target cache name, `--` when nothing is written
    #[tabled(rename = "CACHE")]
    pub cache: String,
}

impl RouteDisplay {
    pub fn new(request: &Request, route: Route, buckets: &BucketSet) -> Self {
        let (label, cache) = match route {
            Route::Bypass => ("bypass".to_string(), "--".to_string()),
            Route::NetworkFirst => ("network-first".to_string(), "--".to_string()),
            Route::Cached(bucket) => (format!("network-first → {}", bucket), buckets.name(bucket)),
        };
        Self {
            method: request.method.to_string(),
            url: request.url.to_string(),
            route: label,
            cache,
        }
    }
}

/// A queued background-sync request
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct PendingDisplay {
    #[tabled(rename = "ID")]
    pub id: i64,

    #[tabled(rename = "METHOD")]
    pub method: String,

    #[tabled(rename = "URL")]
    pub url: String,

    #[tabled(rename = "QUEUED")]
    pub queued: String,
}

impl From<&PendingAction> for PendingDisplay {
    fn from(action: &PendingAction) -> Self {
        Self {
            id: action.id,
            method: action.method.clone(),
            url: truncate_string(&action.url, URL_WIDTH),
            queued: format_timestamp_local(Some(&action.queued_at)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Bucket;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn buckets() -> BucketSet {
        BucketSet::new("v2", Duration::from_secs(300))
    }

    fn stats(name: &str) -> CacheNameStats {
        CacheNameStats {
            name: name.to_string(),
            entries: 3,
            size_bytes: 4096,
            oldest_entry: None,
            newest_entry: None,
        }
    }

    #[test]
    fn test_bucket_display_marks_current_and_stale() {
        let buckets = buckets();
        let current = BucketDisplay::new(&stats(&buckets.name(Bucket::Static)), &buckets);
        let stale = BucketDisplay::new(&stats("flixcore-static-v1"), &buckets);

        assert_eq!(current.status, "current");
        assert_eq!(stale.status, "stale");
        assert_eq!(current.size, "4.00 KB");
        assert_eq!(current.newest, "N/A");
    }

    #[test]
    fn test_route_display_names_target_cache() {
        let buckets = buckets();
        let request = Request::get("http://localhost:3000/icons/icon-72x72.png").unwrap();

        let display = RouteDisplay::new(&request, Route::Cached(Bucket::Static), &buckets);
        assert_eq!(display.method, "GET");
        assert_eq!(display.cache, buckets.name(Bucket::Static));
        assert!(display.route.contains("static"));

        let bypass = RouteDisplay::new(&request, Route::Bypass, &buckets);
        assert_eq!(bypass.route, "bypass");
        assert_eq!(bypass.cache, "--");
    }

    #[test]
    fn test_pending_display_truncates_url() {
        let long = format!("http://localhost:3000/api/notes/{}", "x".repeat(80));
        let mut action = PendingAction::new(
            reqwest::Method::POST,
            &long,
            None,
            Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap(),
        );
        action.id = 7;

        let display = PendingDisplay::from(&action);
        assert_eq!(display.id, 7);
        assert_eq!(display.method, "POST");
        assert_eq!(display.url.chars().count(), URL_WIDTH);
    }
}
