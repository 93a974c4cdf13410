//! Offline cache controller
//!
//! Routes intercepted requests into versioned buckets and answers them
//! network-first, falling back to cached copies, the offline page and
//! finally a synthetic 503. Storage lives behind [`CacheStore`] so the
//! controller runs against SQLite on disk or an in-memory map.

pub mod bucket;
pub mod classify;
pub mod controller;
pub mod fetch;
pub mod http;
pub mod key;
pub mod memory;
pub mod notify;
pub mod storage;
pub mod sync;
pub mod worker;

pub use bucket::{Bucket, BucketSet};
pub use classify::{Route, RoutePolicy, classify};
pub use controller::{ActivateReport, CacheController, InstallReport};
pub use fetch::{Fetcher, HttpFetcher};
pub use http::{Request, RequestMode, Response, ResponseSource};
pub use memory::MemoryCacheStore;
pub use storage::{CacheNameStats, CacheStats, CacheStore, ClearStats, SqliteCacheStore, StoredEntry};
pub use sync::{MemorySyncQueue, PendingAction, SqliteSyncQueue, SyncQueue, SyncReport};
pub use worker::{EventHandler, EventOutcome, HeadlessHost, ServiceWorker, WorkerEvent, WorkerHost, WorkerMessage};
