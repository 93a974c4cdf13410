//! Progress document stores
//!
//! [`ProgressStore`] is the persistence contract the reconciler and the
//! summary aggregator depend on. The in-memory and SQLite stores publish
//! local changes through a [`ChangeFeed`]. The SQLite store also polls the
//! database so writes from other handles and processes reach subscribers;
//! the HTTP store lives in `crate::client` and only polls.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::record::{ProgressKey, ProgressRecord, ProgressUpdate};
use crate::clock::SharedClock;
use crate::error::StoreError;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Snapshot delivered to subscribers: every record of one user
pub type Snapshot = Result<Vec<ProgressRecord>>;

/// Persistence contract for progress documents
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn get(&self, key: &ProgressKey) -> Result<Option<ProgressRecord>>;

    /// Merge `update` into the stored document and stamp `updated_at`.
    async fn upsert(&self, key: &ProgressKey, update: &ProgressUpdate) -> Result<ProgressRecord>;

    async fn get_all(&self, user_id: &str) -> Result<Vec<ProgressRecord>>;

    /// Live query over one user's records. The first item is the current
    /// set; later items follow every change. Dropping the subscription
    /// unsubscribes.
    async fn subscribe(&self, user_id: &str) -> Result<Subscription>;
}

/// Stream of snapshots for one user
pub struct Subscription {
    rx: mpsc::Receiver<Snapshot>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Wrap a channel fed by some producer task
    pub fn new(rx: mpsc::Receiver<Snapshot>, task: Option<JoinHandle<()>>) -> Self {
        Self { rx, task }
    }

    /// Next snapshot, or `None` once the producer is gone
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Broadcast of "user X changed" notifications for in-process stores
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<String>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }
}

impl ChangeFeed {
    pub fn notify(&self, user_id: &str) {
        // No receivers is fine
        let _ = self.tx.send(user_id.to_string());
    }

    /// Subscribe to one user, re-reading the full set with `load` after
    /// every change.
    pub fn subscribe<L, Fut>(&self, user_id: &str, load: L) -> Subscription
    where
        L: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Snapshot> + Send + 'static,
    {
        let mut changes = self.tx.subscribe();
        let (tx, rx) = mpsc::channel(16);
        let user_id = user_id.to_string();

        let task = tokio::spawn(async move {
            if tx.send(load().await).await.is_err() {
                return;
            }
            loop {
                match changes.recv().await {
                    Ok(changed) if changed == user_id => {}
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::debug!("Subscription for {} lagged by {}", user_id, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
                if tx.send(load().await).await.is_err() {
                    break;
                }
            }
        });

        Subscription::new(rx, Some(task))
    }
}

/// In-process store
#[derive(Clone)]
pub struct MemoryProgressStore {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    records: Mutex<HashMap<ProgressKey, ProgressRecord>>,
    fail_writes: Mutex<bool>,
    feed: ChangeFeed,
    clock: SharedClock,
}

impl MemoryProgressStore {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                records: Mutex::new(HashMap::new()),
                fail_writes: Mutex::new(false),
                feed: ChangeFeed::default(),
                clock,
            }),
        }
    }

    /// Make every upsert fail with a network error until switched back
    pub fn set_fail_writes(&self, fail: bool) {
        if let Ok(mut flag) = self.inner.fail_writes.lock() {
            *flag = fail;
        }
    }

    /// Insert a document as-is, bypassing the merge rule
    pub fn insert(&self, record: ProgressRecord) -> Result<()> {
        let user_id = record.key.user_id.clone();
        self.records()?.insert(record.key.clone(), record);
        self.inner.feed.notify(&user_id);
        Ok(())
    }

    fn records(&self) -> Result<MutexGuard<'_, HashMap<ProgressKey, ProgressRecord>>> {
        self.inner
            .records
            .lock()
            .map_err(|_| StoreError::Storage("progress store lock poisoned".to_string()))
    }

    fn load_all(&self, user_id: &str) -> Result<Vec<ProgressRecord>> {
        let mut records: Vec<ProgressRecord> = self
            .records()?
            .values()
            .filter(|r| r.key.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(records)
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn get(&self, key: &ProgressKey) -> Result<Option<ProgressRecord>> {
        Ok(self.records()?.get(key).cloned())
    }

    async fn upsert(&self, key: &ProgressKey, update: &ProgressUpdate) -> Result<ProgressRecord> {
        if self.inner.fail_writes.lock().map(|f| *f).unwrap_or(false) {
            return Err(StoreError::Network("store unavailable".to_string()));
        }

        let record = {
            let mut records = self.records()?;
            let merged =
                ProgressRecord::merged(key, records.get(key), update, self.inner.clock.now());
            records.insert(key.clone(), merged.clone());
            merged
        };
        self.inner.feed.notify(&key.user_id);
        Ok(record)
    }

    async fn get_all(&self, user_id: &str) -> Result<Vec<ProgressRecord>> {
        self.load_all(user_id)
    }

    async fn subscribe(&self, user_id: &str) -> Result<Subscription> {
        let store = self.clone();
        let user = user_id.to_string();
        Ok(self.inner.feed.subscribe(user_id, move || {
            let result = store.load_all(&user);
            async move { result }
        }))
    }
}

/// Schema version - bump when changing table structure
const SCHEMA_VERSION: i32 = 1;

/// How often subscriptions re-read the database for outside writes
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Local SQLite store used by the CLI
#[derive(Clone)]
pub struct SqliteProgressStore {
    conn: Arc<Mutex<Connection>>,
    feed: ChangeFeed,
    clock: SharedClock,
    poll_interval: Duration,
}

impl SqliteProgressStore {
    /// Default database location (~/.local/share/flixcore/progress.db)
    pub fn default_path() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|d| d.join("flixcore").join("progress.db"))
            .ok_or_else(|| StoreError::Storage("Could not determine data directory".to_string()))
    }

    pub fn open_at(path: &Path, clock: SharedClock) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Storage(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let conn = Connection::open(path)?;
        let version: i32 = conn.pragma_query_value(None, "user_version", |r| r.get(0))?;
        if version != 0 && version != SCHEMA_VERSION {
            log::warn!(
                "Progress schema version mismatch ({} != {}), rebuilding",
                version,
                SCHEMA_VERSION
            );
            conn.execute_batch("DROP TABLE IF EXISTS progress;")?;
        }

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS progress (
                user_id TEXT NOT NULL,
                course_id TEXT NOT NULL,
                video_id TEXT NOT NULL,
                watched_seconds REAL NOT NULL,
                last_position REAL NOT NULL,
                total_seconds REAL NOT NULL DEFAULT 0,
                is_completed INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT,
                PRIMARY KEY (user_id, course_id, video_id)
            );
            CREATE INDEX IF NOT EXISTS idx_progress_user ON progress(user_id);
            "#,
        )?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            feed: ChangeFeed::default(),
            clock,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Set how often subscriptions look for writes made elsewhere
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(10));
        self
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Storage("progress db lock poisoned".to_string()))
    }

    fn read_one(conn: &Connection, key: &ProgressKey) -> Result<Option<ProgressRecord>> {
        let row = conn
            .query_row(
                "SELECT user_id, course_id, video_id, watched_seconds, last_position,
                        total_seconds, is_completed, updated_at
                 FROM progress WHERE user_id = ?1 AND course_id = ?2 AND video_id = ?3",
                params![key.user_id, key.course_id, key.video_id],
                RawRow::from_row,
            )
            .optional()?;
        row.map(RawRow::into_record).transpose()
    }

    /// Distinct values of one key field, most recently updated first
    pub fn distinct(&self, field: KeyField) -> Result<Vec<String>> {
        let column = field.column();
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {column} FROM progress GROUP BY {column} ORDER BY MAX(updated_at) DESC"
        ))?;
        let ids = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn load_all(&self, user_id: &str) -> Result<Vec<ProgressRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, course_id, video_id, watched_seconds, last_position,
                    total_seconds, is_completed, updated_at
             FROM progress WHERE user_id = ?1 ORDER BY course_id, video_id",
        )?;
        let rows = stmt
            .query_map([user_id], RawRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawRow::into_record).collect()
    }
}

/// Identity fields of a progress document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyField {
    User,
    Course,
    Video,
}

impl KeyField {
    fn column(&self) -> &'static str {
        match self {
            KeyField::User => "user_id",
            KeyField::Course => "course_id",
            KeyField::Video => "video_id",
        }
    }
}

/// Row as stored; `updated_at` is parsed separately so a malformed value
/// surfaces as `InvalidResponse` instead of a SQLite error.
struct RawRow {
    key: ProgressKey,
    watched_seconds: f64,
    last_position: f64,
    total_seconds: f64,
    is_completed: bool,
    updated_at: Option<String>,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: ProgressKey::new(
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ),
            watched_seconds: row.get(3)?,
            last_position: row.get(4)?,
            total_seconds: row.get(5)?,
            is_completed: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_record(self) -> Result<ProgressRecord> {
        let updated_at = self
            .updated_at
            .map(|raw| {
                DateTime::parse_from_rfc3339(&raw)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|e| {
                        StoreError::InvalidResponse(format!(
                            "Malformed updatedAt '{}' for {}: {}",
                            raw, self.key, e
                        ))
                    })
            })
            .transpose()?;

        Ok(ProgressRecord {
            key: self.key,
            watched_seconds: self.watched_seconds,
            last_position: self.last_position,
            total_seconds: self.total_seconds,
            is_completed: self.is_completed,
            updated_at,
        })
    }
}

#[async_trait]
impl ProgressStore for SqliteProgressStore {
    async fn get(&self, key: &ProgressKey) -> Result<Option<ProgressRecord>> {
        let conn = self.conn()?;
        Self::read_one(&conn, key)
    }

    async fn upsert(&self, key: &ProgressKey, update: &ProgressUpdate) -> Result<ProgressRecord> {
        let record = {
            let mut conn = self.conn()?;
            let tx = conn.transaction()?;
            let existing = Self::read_one(&tx, key)?;
            let merged = ProgressRecord::merged(key, existing.as_ref(), update, self.clock.now());
            tx.execute(
                "INSERT OR REPLACE INTO progress
                 (user_id, course_id, video_id, watched_seconds, last_position,
                  total_seconds, is_completed, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    key.user_id,
                    key.course_id,
                    key.video_id,
                    merged.watched_seconds,
                    merged.last_position,
                    merged.total_seconds,
                    merged.is_completed,
                    merged.updated_at.map(|t| t.to_rfc3339()),
                ],
            )?;
            tx.commit()?;
            merged
        };
        log::debug!(
            "Saved progress {}: watched={:.1}s position={:.1}s completed={}",
            key,
            record.watched_seconds,
            record.last_position,
            record.is_completed
        );
        self.feed.notify(&key.user_id);
        Ok(record)
    }

    async fn get_all(&self, user_id: &str) -> Result<Vec<ProgressRecord>> {
        self.load_all(user_id)
    }

    /// Wakes on local writes and on every poll tick; a snapshot is only
    /// sent when the user's records differ from the last one sent.
    async fn subscribe(&self, user_id: &str) -> Result<Subscription> {
        let store = self.clone();
        let user_id = user_id.to_string();
        let mut changes = self.feed.tx.subscribe();
        let (tx, rx) = mpsc::channel(16);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(store.poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut last: Option<Vec<ProgressRecord>> = None;

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    change = changes.recv() => match change {
                        Ok(changed) if changed != user_id => continue,
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            log::debug!("Subscription for {} lagged by {}", user_id, skipped);
                        }
                        // The task holds a store clone, so the sender outlives it
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }

                let snapshot = store.load_all(&user_id);
                let changed = match (&snapshot, &last) {
                    (Ok(records), Some(previous)) => records != previous,
                    _ => true,
                };
                if let Ok(records) = &snapshot {
                    last = Some(records.clone());
                }
                if changed && tx.send(snapshot).await.is_err() {
                    break;
                }
            }
        });

        Ok(Subscription::new(rx, Some(task)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FixedClock, system_clock};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn update(watched: f64, position: f64, completed: bool) -> ProgressUpdate {
        ProgressUpdate {
            watched_seconds: watched,
            last_position: position,
            total_seconds: 600.0,
            is_completed: completed,
        }
    }

    #[tokio::test]
    async fn test_memory_upsert_merges_and_stamps() {
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        let store = MemoryProgressStore::new(Arc::new(FixedClock::new(at)));
        let key = ProgressKey::new("u1", "c1", "v1");

        store.upsert(&key, &update(120.0, 120.0, false)).await.unwrap();
        let record = store.upsert(&key, &update(60.0, 60.0, false)).await.unwrap();

        assert_eq!(record.watched_seconds, 120.0);
        assert_eq!(record.last_position, 60.0);
        assert_eq!(record.updated_at, Some(at));
        assert_eq!(store.get(&key).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_memory_get_all_filters_by_user() {
        let store = MemoryProgressStore::new(system_clock());
        store
            .upsert(&ProgressKey::new("u1", "c1", "v1"), &update(1.0, 1.0, false))
            .await
            .unwrap();
        store
            .upsert(&ProgressKey::new("u2", "c1", "v1"), &update(1.0, 1.0, false))
            .await
            .unwrap();

        let all = store.get_all("u1").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].key.user_id, "u1");
    }

    #[tokio::test]
    async fn test_subscription_emits_initial_and_changes() {
        let store = MemoryProgressStore::new(system_clock());
        let mut sub = store.subscribe("u1").await.unwrap();

        assert!(sub.next().await.unwrap().unwrap().is_empty());

        store
            .upsert(&ProgressKey::new("u2", "c1", "v1"), &update(5.0, 5.0, false))
            .await
            .unwrap();
        store
            .upsert(&ProgressKey::new("u1", "c1", "v1"), &update(5.0, 5.0, false))
            .await
            .unwrap();

        let next = sub.next().await.unwrap().unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].key.user_id, "u1");
    }

    #[tokio::test]
    async fn test_memory_failing_writes() {
        let store = MemoryProgressStore::new(system_clock());
        store.set_fail_writes(true);
        let err = store
            .upsert(&ProgressKey::new("u1", "c1", "v1"), &update(5.0, 5.0, false))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Network(_)));
    }

    #[tokio::test]
    async fn test_sqlite_round_trip_and_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.db");
        let key = ProgressKey::new("u1", "c1", "v1");

        {
            let store = SqliteProgressStore::open_at(&path, system_clock()).unwrap();
            store.upsert(&key, &update(300.0, 300.0, false)).await.unwrap();
            store.upsert(&key, &update(100.0, 100.0, true)).await.unwrap();
        }

        let store = SqliteProgressStore::open_at(&path, system_clock()).unwrap();
        let record = store.get(&key).await.unwrap().unwrap();
        assert_eq!(record.watched_seconds, 300.0);
        assert_eq!(record.last_position, 100.0);
        assert!(record.is_completed);
        assert!(record.updated_at.is_some());
        assert_eq!(store.get_all("u1").await.unwrap().len(), 1);
        assert!(store.get(&ProgressKey::new("u1", "c1", "v2")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_distinct_ids_newest_first() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()));
        let store = SqliteProgressStore::open_at(&dir.path().join("p.db"), clock.clone()).unwrap();

        store
            .upsert(&ProgressKey::new("ana", "c1", "v1"), &update(1.0, 1.0, false))
            .await
            .unwrap();
        clock.advance(chrono::Duration::hours(1));
        store
            .upsert(&ProgressKey::new("bruno", "c2", "v1"), &update(1.0, 1.0, false))
            .await
            .unwrap();

        assert_eq!(store.distinct(KeyField::User).unwrap(), vec!["bruno", "ana"]);
        assert_eq!(store.distinct(KeyField::Video).unwrap(), vec!["v1"]);
    }

    #[tokio::test]
    async fn test_sqlite_malformed_timestamp_is_invalid_response() {
        let dir = TempDir::new().unwrap();
        let store = SqliteProgressStore::open_at(&dir.path().join("p.db"), system_clock()).unwrap();
        store
            .conn()
            .unwrap()
            .execute(
                "INSERT INTO progress (user_id, course_id, video_id, watched_seconds,
                 last_position, updated_at) VALUES ('u1', 'c1', 'v1', 1, 1, 'yesterday')",
                [],
            )
            .unwrap();

        let err = store.get_all("u1").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_sqlite_subscription_sees_writes_from_another_handle() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.db");
        let reader = SqliteProgressStore::open_at(&path, system_clock())
            .unwrap()
            .with_poll_interval(Duration::from_millis(50));
        let writer = SqliteProgressStore::open_at(&path, system_clock()).unwrap();

        let mut sub = reader.subscribe("u1").await.unwrap();
        assert!(sub.next().await.unwrap().unwrap().is_empty());

        writer
            .upsert(&ProgressKey::new("u1", "c1", "v1"), &update(42.0, 42.0, false))
            .await
            .unwrap();

        let next = tokio::time::timeout(Duration::from_secs(2), sub.next())
            .await
            .expect("subscription stayed silent")
            .unwrap()
            .unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].watched_seconds, 42.0);
    }

    #[tokio::test]
    async fn test_sqlite_subscription_quiet_without_changes() {
        let dir = TempDir::new().unwrap();
        let store = SqliteProgressStore::open_at(&dir.path().join("p.db"), system_clock())
            .unwrap()
            .with_poll_interval(Duration::from_millis(20));

        let mut sub = store.subscribe("u1").await.unwrap();
        sub.next().await.unwrap().unwrap();

        let quiet = tokio::time::timeout(Duration::from_millis(200), sub.next()).await;
        assert!(quiet.is_err());
    }
}
