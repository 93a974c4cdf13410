//! Versioned cache buckets
//!
//! Each bucket is its own cache namespace. Names carry the configured
//! version so that a new version retires every older cache on activate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::config::CacheSettings;

const NAME_PREFIX: &str = "flixcore";

/// Cache partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    /// Build assets, icons, fonts, manifest
    Static,
    /// App and course pages, course/user API responses
    Dynamic,
    /// Other API responses, short-lived
    Runtime,
}

impl Bucket {
    pub const ALL: [Bucket; 3] = [Bucket::Static, Bucket::Dynamic, Bucket::Runtime];

    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Static => "static",
            Bucket::Dynamic => "dynamic",
            Bucket::Runtime => "runtime",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current bucket names and per-bucket max-age
#[derive(Debug, Clone)]
pub struct BucketSet {
    version: String,
    runtime_max_age: Duration,
}

impl BucketSet {
    pub fn new(version: impl Into<String>, runtime_max_age: Duration) -> Self {
        Self {
            version: version.into(),
            runtime_max_age,
        }
    }

    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new(settings.version.clone(), settings.runtime_max_age())
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Cache name for a bucket, e.g. `flixcore-static-v1`
    pub fn name(&self, bucket: Bucket) -> String {
        format!("{}-{}-{}", NAME_PREFIX, bucket.as_str(), self.version)
    }

    /// Max tolerated entry age; `None` means entries never go stale
    pub fn max_age(&self, bucket: Bucket) -> Option<Duration> {
        match bucket {
            Bucket::Runtime => Some(self.runtime_max_age),
            Bucket::Static | Bucket::Dynamic => None,
        }
    }

    pub fn current_names(&self) -> Vec<String> {
        Bucket::ALL.iter().map(|b| self.name(*b)).collect()
    }

    /// Whether a cache name belongs to the current version
    pub fn is_current(&self, cache_name: &str) -> bool {
        Bucket::ALL.iter().any(|b| self.name(*b) == cache_name)
    }
}
