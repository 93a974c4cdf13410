//! Command execution context
//!
//! Loads configuration once and builds the stores and controller a
//! command needs.

use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::{
    CacheController, HeadlessHost, HttpFetcher, ServiceWorker, SqliteCacheStore, SqliteSyncQueue,
};
use crate::cli::{GlobalOptions, OutputFormat};
use crate::client::HttpProgressStore;
use crate::clock::{SharedClock, system_clock};
use crate::config::Config;
use crate::error::Result;
use crate::progress::{ProgressStore, SessionSettings, SqliteProgressStore};

/// Controller wired to the real network and the on-disk cache
pub type DiskController = CacheController<HttpFetcher, SqliteCacheStore>;

/// Worker over the disk controller and queue, with no browser attached
pub type DiskWorker = ServiceWorker<HttpFetcher, SqliteCacheStore, SqliteSyncQueue, HeadlessHost>;

pub struct CommandContext {
    pub config: Config,
    pub format: OutputFormat,
    pub remote: bool,
    pub clock: SharedClock,
}

impl CommandContext {
    pub fn new(opts: &GlobalOptions) -> Result<Self> {
        let config = Config::load_at(opts.config_ref())?;
        Ok(Self {
            config,
            format: opts.format,
            remote: opts.remote,
            clock: system_clock(),
        })
    }

    /// Cache directory: `cache.dir` or ~/.cache/flixcore
    pub fn cache_dir(&self) -> Result<PathBuf> {
        match &self.config.cache.dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(SqliteCacheStore::cache_dir()?),
        }
    }

    pub fn cache_store(&self) -> Result<SqliteCacheStore> {
        let store = SqliteCacheStore::open_at(&self.cache_dir()?)?;
        Ok(store.with_quota(self.config.cache.quota_bytes))
    }

    pub fn controller(&self) -> Result<DiskController> {
        CacheController::new(
            Arc::new(HttpFetcher::new()?),
            Arc::new(self.cache_store()?),
            &self.config.cache,
            self.clock.clone(),
        )
    }

    pub fn sync_queue(&self) -> Result<SqliteSyncQueue> {
        Ok(SqliteSyncQueue::open_at(&self.cache_dir()?)?)
    }

    pub fn worker(&self) -> Result<DiskWorker> {
        Ok(ServiceWorker::new(
            self.controller()?,
            Arc::new(self.sync_queue()?),
            Arc::new(HeadlessHost::new()),
        ))
    }

    pub fn progress_db_path(&self) -> Result<PathBuf> {
        match &self.config.progress.db_path {
            Some(path) => Ok(path.clone()),
            None => Ok(SqliteProgressStore::default_path()?),
        }
    }

    /// Remote API with `--remote`, otherwise the local database
    pub fn progress_store(&self) -> Result<Arc<dyn ProgressStore>> {
        if self.remote {
            log::debug!("Using remote progress store");
            Ok(Arc::new(HttpProgressStore::from_settings(&self.config.api)?))
        } else {
            let path = self.progress_db_path()?;
            log::debug!("Using local progress store at {}", path.display());
            Ok(Arc::new(SqliteProgressStore::open_at(&path, self.clock.clone())?))
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings::from(&self.config.progress)
    }
}
