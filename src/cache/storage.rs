//! Cache storage contract and its SQLite implementation
//!
//! Stores small bodies inline in SQLite, large bodies (>10KB) as files.
//! Entries are namespaced by cache name, one namespace per bucket.

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::CacheError;

/// Schema version - increment to trigger nuke-and-rebuild
const SCHEMA_VERSION: i32 = 2;

/// Bodies larger than this are stored as external blobs
const INLINE_THRESHOLD: usize = 10 * 1024; // 10KB

pub type Result<T> = std::result::Result<T, CacheError>;

/// A cached response plus the time it was stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub url: String,
    pub method: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub stored_at: DateTime<Utc>,
}

impl StoredEntry {
    /// Age of the entry relative to `now` (zero if stored in the future)
    pub fn age(&self, now: DateTime<Utc>) -> std::time::Duration {
        (now - self.stored_at).to_std().unwrap_or_default()
    }
}

/// Key-value contract the cache controller runs against.
///
/// Mirrors the browser Cache Storage API: named caches holding entries keyed
/// by request. Implementations must be safe to share across tasks.
pub trait CacheStore: Send + Sync {
    fn get(&self, cache: &str, key: &str) -> Result<Option<StoredEntry>>;

    fn put(&self, cache: &str, key: &str, entry: &StoredEntry) -> Result<()>;

    fn delete(&self, cache: &str, key: &str) -> Result<bool>;

    /// Names of every cache that currently exists
    fn cache_names(&self) -> Result<Vec<String>>;

    /// Drop a whole cache, returning the number of entries removed
    fn delete_cache(&self, cache: &str) -> Result<usize>;

    fn stats(&self) -> Result<CacheStats>;

    /// Drop every cache
    fn clear_all(&self) -> Result<ClearStats> {
        let mut entries_removed = 0;
        for name in self.cache_names()? {
            entries_removed += self.delete_cache(&name)?;
        }
        Ok(ClearStats { entries_removed })
    }
}

/// SQLite-backed cache storage with file blob support
pub struct SqliteCacheStore {
    conn: Mutex<Connection>,
    blobs_dir: PathBuf,
    quota_bytes: Option<u64>,
}

impl SqliteCacheStore {
    /// Open or create cache storage at the default XDG cache location
    pub fn open() -> Result<Self> {
        let cache_dir = Self::cache_dir()?;
        Self::open_at(&cache_dir)
    }

    /// Get the cache directory path (~/.cache/flixcore on Linux)
    pub fn cache_dir() -> Result<PathBuf> {
        let cache_base = dirs::cache_dir().ok_or(CacheError::NoHome)?;
        Ok(cache_base.join("flixcore"))
    }

    /// Apply a storage quota in bytes
    pub fn with_quota(mut self, quota_bytes: Option<u64>) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    /// Open cache storage at a specific directory
    pub fn open_at(cache_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(cache_dir)
            .map_err(|e| CacheError::Io(format!("Failed to create cache dir: {}", e)))?;

        let db_path = cache_dir.join("cache.db");
        let blobs_dir = cache_dir.join("blobs");
        std::fs::create_dir_all(&blobs_dir)
            .map_err(|e| CacheError::Io(format!("Failed to create blobs dir: {}", e)))?;

        let conn = Connection::open(&db_path)?;

        // Check schema version - nuke if mismatched
        let version: i32 = conn
            .pragma_query_value(None, "user_version", |r| r.get(0))
            .unwrap_or(0);

        if version != 0 && version != SCHEMA_VERSION {
            log::info!(
                "Cache schema version mismatch ({} != {}), rebuilding",
                version,
                SCHEMA_VERSION
            );
            drop(conn);
            Self::nuke(&db_path, &blobs_dir)?;
            return Self::open_at(cache_dir);
        }

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS caches (
                name TEXT PRIMARY KEY NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS cache_entries (
                cache_name TEXT NOT NULL,
                cache_key TEXT NOT NULL,
                url TEXT NOT NULL,
                method TEXT NOT NULL,
                status INTEGER NOT NULL,
                headers TEXT NOT NULL,
                data BLOB,
                blob_path TEXT,
                stored_at INTEGER NOT NULL,
                size_bytes INTEGER NOT NULL,
                PRIMARY KEY (cache_name, cache_key)
            );

            CREATE INDEX IF NOT EXISTS idx_stored_at ON cache_entries(stored_at);
            "#,
        )?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        Ok(Self {
            conn: Mutex::new(conn),
            blobs_dir,
            quota_bytes: None,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CacheError::Io("cache connection lock poisoned".to_string()))
    }

    fn used_bytes(conn: &Connection) -> Result<u64> {
        let used: i64 = conn.query_row(
            "SELECT COALESCE(SUM(size_bytes), 0) FROM cache_entries",
            [],
            |r| r.get(0),
        )?;
        Ok(used.max(0) as u64)
    }

    fn existing_size(conn: &Connection, cache: &str, key: &str) -> Result<Option<(u64, Option<String>)>> {
        let row: Option<(i64, Option<String>)> = conn
            .query_row(
                "SELECT size_bytes, blob_path FROM cache_entries
                 WHERE cache_name = ?1 AND cache_key = ?2",
                params![cache, key],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        Ok(row.map(|(size, blob)| (size.max(0) as u64, blob)))
    }

    /// Write a blob file, sharded by first 2 chars of key
    fn write_blob(&self, cache: &str, key: &str, data: &[u8]) -> Result<String> {
        let shard = &key[..2.min(key.len())];
        let shard_dir = self.blobs_dir.join(shard);
        std::fs::create_dir_all(&shard_dir)
            .map_err(|e| CacheError::Io(format!("Failed to create shard dir: {}", e)))?;

        let filename = format!("{}-{}.bin", cache, key);
        let rel_path = format!("{}/{}", shard, filename);
        let full_path = shard_dir.join(&filename);

        std::fs::write(&full_path, data)
            .map_err(|e| CacheError::Io(format!("Failed to write blob: {}", e)))?;

        Ok(rel_path)
    }

    fn remove_blob(&self, rel_path: &str) {
        if let Err(e) = std::fs::remove_file(self.blobs_dir.join(rel_path)) {
            log::warn!("Failed to remove blob {}: {}", rel_path, e);
        }
    }

    /// Nuke the cache (delete DB and all blobs)
    fn nuke(db_path: &Path, blobs_dir: &Path) -> Result<()> {
        if db_path.exists() {
            std::fs::remove_file(db_path)
                .map_err(|e| CacheError::Io(format!("Failed to remove cache DB: {}", e)))?;
        }
        if blobs_dir.exists() {
            std::fs::remove_dir_all(blobs_dir)
                .map_err(|e| CacheError::Io(format!("Failed to remove blobs dir: {}", e)))?;
        }
        Ok(())
    }
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_default()
}

impl CacheStore for SqliteCacheStore {
    fn get(&self, cache: &str, key: &str) -> Result<Option<StoredEntry>> {
        let conn = self.conn()?;

        #[allow(clippy::type_complexity)]
        let row: Option<(String, String, u16, String, Option<Vec<u8>>, Option<String>, i64)> = conn
            .query_row(
                "SELECT url, method, status, headers, data, blob_path, stored_at
                 FROM cache_entries WHERE cache_name = ?1 AND cache_key = ?2",
                params![cache, key],
                |r| {
                    Ok((
                        r.get(0)?,
                        r.get(1)?,
                        r.get(2)?,
                        r.get(3)?,
                        r.get(4)?,
                        r.get(5)?,
                        r.get(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((url, method, status, headers, data, blob_path, stored_at)) = row else {
            return Ok(None);
        };

        let body = match (data, blob_path) {
            (Some(data), None) => data,
            (None, Some(blob_path)) => match std::fs::read(self.blobs_dir.join(&blob_path)) {
                Ok(data) => data,
                Err(e) => {
                    log::warn!("Failed to read blob {}: {}", blob_path, e);
                    // Delete stale entry
                    let _ = conn.execute(
                        "DELETE FROM cache_entries WHERE cache_name = ?1 AND cache_key = ?2",
                        params![cache, key],
                    );
                    return Ok(None);
                }
            },
            _ => Vec::new(),
        };

        Ok(Some(StoredEntry {
            url,
            method,
            status,
            headers: serde_json::from_str(&headers)?,
            body,
            stored_at: millis_to_datetime(stored_at),
        }))
    }

    fn put(&self, cache: &str, key: &str, entry: &StoredEntry) -> Result<()> {
        let conn = self.conn()?;
        let size = entry.body.len();

        let previous = Self::existing_size(&conn, cache, key)?;
        if let Some(quota) = self.quota_bytes {
            let used = Self::used_bytes(&conn)?;
            let reclaimed = previous.as_ref().map(|(s, _)| *s).unwrap_or(0);
            if used.saturating_sub(reclaimed) + size as u64 > quota {
                return Err(CacheError::QuotaExceeded {
                    cache: cache.to_string(),
                    bytes: size,
                });
            }
        }

        let headers = serde_json::to_string(&entry.headers)?;
        let stored_at = entry.stored_at.timestamp_millis();

        conn.execute(
            "INSERT OR IGNORE INTO caches (name, created_at) VALUES (?1, ?2)",
            params![cache, Utc::now().timestamp_millis()],
        )?;

        if size <= INLINE_THRESHOLD {
            conn.execute(
                "INSERT OR REPLACE INTO cache_entries
                 (cache_name, cache_key, url, method, status, headers, data, blob_path, stored_at, size_bytes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8, ?9)",
                params![
                    cache,
                    key,
                    entry.url,
                    entry.method,
                    entry.status,
                    headers,
                    entry.body,
                    stored_at,
                    size
                ],
            )?;
        } else {
            let blob_path = self.write_blob(cache, key, &entry.body)?;
            conn.execute(
                "INSERT OR REPLACE INTO cache_entries
                 (cache_name, cache_key, url, method, status, headers, data, blob_path, stored_at, size_bytes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?8, ?9)",
                params![
                    cache,
                    key,
                    entry.url,
                    entry.method,
                    entry.status,
                    headers,
                    blob_path,
                    stored_at,
                    size
                ],
            )?;
            if let Some((_, Some(old_blob))) = &previous
                && *old_blob != blob_path
            {
                self.remove_blob(old_blob);
            }
            return Ok(());
        }

        if let Some((_, Some(old_blob))) = previous {
            self.remove_blob(&old_blob);
        }
        Ok(())
    }

    fn delete(&self, cache: &str, key: &str) -> Result<bool> {
        let conn = self.conn()?;
        let previous = Self::existing_size(&conn, cache, key)?;
        let deleted = conn.execute(
            "DELETE FROM cache_entries WHERE cache_name = ?1 AND cache_key = ?2",
            params![cache, key],
        )?;
        if let Some((_, Some(blob))) = previous {
            self.remove_blob(&blob);
        }
        Ok(deleted > 0)
    }

    fn cache_names(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT name FROM caches ORDER BY name")?;
        let names = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn delete_cache(&self, cache: &str) -> Result<usize> {
        let conn = self.conn()?;

        let blobs: Vec<String> = {
            let mut stmt = conn.prepare(
                "SELECT blob_path FROM cache_entries
                 WHERE cache_name = ?1 AND blob_path IS NOT NULL",
            )?;
            stmt.query_map([cache], |r| r.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?
        };

        let deleted = conn.execute("DELETE FROM cache_entries WHERE cache_name = ?1", [cache])?;
        conn.execute("DELETE FROM caches WHERE name = ?1", [cache])?;

        for blob in blobs {
            self.remove_blob(&blob);
        }
        Ok(deleted)
    }

    fn stats(&self) -> Result<CacheStats> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT c.name, COUNT(e.cache_key), COALESCE(SUM(e.size_bytes), 0),
                    MIN(e.stored_at), MAX(e.stored_at)
             FROM caches c LEFT JOIN cache_entries e ON e.cache_name = c.name
             GROUP BY c.name ORDER BY c.name",
        )?;
        let caches = stmt
            .query_map([], |r| {
                Ok(CacheNameStats {
                    name: r.get(0)?,
                    entries: r.get::<_, i64>(1)? as usize,
                    size_bytes: r.get::<_, i64>(2)? as usize,
                    oldest_entry: r.get::<_, Option<i64>>(3)?.map(millis_to_datetime),
                    newest_entry: r.get::<_, Option<i64>>(4)?.map(millis_to_datetime),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(CacheStats::from_caches(caches, self.quota_bytes))
    }
}

/// Statistics about cache clear operation
#[derive(Debug)]
pub struct ClearStats {
    pub entries_removed: usize,
}

/// Statistics for a single named cache
#[derive(Debug, Clone, Serialize)]
pub struct CacheNameStats {
    pub name: String,
    pub entries: usize,
    pub size_bytes: usize,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
}

/// Statistics about cache state
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_size_bytes: usize,
    pub quota_bytes: Option<u64>,
    pub caches: Vec<CacheNameStats>,
}

impl CacheStats {
    pub fn from_caches(caches: Vec<CacheNameStats>, quota_bytes: Option<u64>) -> Self {
        Self {
            total_entries: caches.iter().map(|c| c.entries).sum(),
            total_size_bytes: caches.iter().map(|c| c.size_bytes).sum(),
            quota_bytes,
            caches,
        }
    }

    pub fn entries_in(&self, cache: &str) -> usize {
        self.caches
            .iter()
            .find(|c| c.name == cache)
            .map(|c| c.entries)
            .unwrap_or(0)
    }
}
