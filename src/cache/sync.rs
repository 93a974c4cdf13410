//! Background sync queue
//!
//! Requests the page could not deliver while offline are queued here and
//! replayed when a `sync` event with the background-sync tag arrives.
//! Successful replays are removed; failures stay queued for the next sync.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use reqwest::Method;
use rusqlite::{Connection, params};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::fetch::Fetcher;
use super::http::Request;
use crate::error::{CacheError, FetchError};

/// Sync tag that triggers a queue drain
pub const BACKGROUND_SYNC_TAG: &str = "background-sync";

type Result<T> = std::result::Result<T, CacheError>;

/// A request waiting to be replayed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    #[serde(default)]
    pub id: i64,
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(
        default,
        serialize_with = "serialize_body",
        deserialize_with = "deserialize_body"
    )]
    pub body: Option<Vec<u8>>,
    pub queued_at: DateTime<Utc>,
}

fn serialize_body<S: Serializer>(body: &Option<Vec<u8>>, s: S) -> std::result::Result<S::Ok, S::Error> {
    match body {
        Some(bytes) => s.serialize_some(&STANDARD.encode(bytes)),
        None => s.serialize_none(),
    }
}

fn deserialize_body<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<Vec<u8>>, D::Error> {
    let encoded: Option<String> = Option::deserialize(d)?;
    encoded
        .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
        .transpose()
}

impl PendingAction {
    pub fn new(method: Method, url: &str, body: Option<Vec<u8>>, queued_at: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            method: method.to_string(),
            url: url.to_string(),
            headers: Vec::new(),
            body,
            queued_at,
        }
    }

    fn to_request(&self) -> std::result::Result<Request, FetchError> {
        let method = Method::from_bytes(self.method.as_bytes())
            .map_err(|e| FetchError::InvalidRequest(e.to_string()))?;
        let mut request = Request::new(method, &self.url)?;
        request.headers = self.headers.clone();
        request.body = self.body.clone();
        Ok(request)
    }
}

/// Storage for pending actions, in insertion order
pub trait SyncQueue: Send + Sync {
    /// Queue an action, returning its id
    fn enqueue(&self, action: &PendingAction) -> Result<i64>;

    fn pending(&self) -> Result<Vec<PendingAction>>;

    fn remove(&self, id: i64) -> Result<bool>;
}

/// Outcome of draining the queue
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub replayed: usize,
    pub failed: usize,
    /// Actions that can never be replayed, removed from the queue
    pub dropped: usize,
    pub remaining: usize,
}

/// Replay every pending action in order, removing the ones that succeed.
/// Actions whose method or URL cannot form a request are dropped.
pub async fn drain<Q, F>(queue: &Q, fetcher: &F) -> Result<SyncReport>
where
    Q: SyncQueue + ?Sized,
    F: Fetcher + ?Sized,
{
    let mut report = SyncReport::default();

    for action in queue.pending()? {
        let request = match action.to_request() {
            Ok(request) => request,
            Err(e) => {
                log::warn!(
                    "Dropping queued {} {}: {}",
                    action.method,
                    action.url,
                    e
                );
                queue.remove(action.id)?;
                report.dropped += 1;
                continue;
            }
        };

        match fetcher.fetch(&request).await {
            Ok(response) if response.is_ok() => {
                queue.remove(action.id)?;
                report.replayed += 1;
            }
            Ok(response) => {
                log::warn!(
                    "Background sync of {} {} returned {}",
                    action.method,
                    action.url,
                    response.status
                );
                report.failed += 1;
            }
            Err(e) => {
                log::warn!("Background sync of {} {} failed: {}", action.method, action.url, e);
                report.failed += 1;
            }
        }
    }

    report.remaining = queue.pending()?.len();
    Ok(report)
}

/// SQLite-backed queue
pub struct SqliteSyncQueue {
    conn: Mutex<Connection>,
}

impl SqliteSyncQueue {
    pub fn open_at(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .map_err(|e| CacheError::Io(format!("Failed to create queue dir: {}", e)))?;
        let conn = Connection::open(dir.join("sync.db"))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS pending_actions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                payload TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CacheError::Io("sync queue lock poisoned".to_string()))
    }
}

impl SyncQueue for SqliteSyncQueue {
    fn enqueue(&self, action: &PendingAction) -> Result<i64> {
        let conn = self.conn()?;
        let payload = serde_json::to_string(action)?;
        conn.execute(
            "INSERT INTO pending_actions (payload) VALUES (?1)",
            params![payload],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn pending(&self) -> Result<Vec<PendingAction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, payload FROM pending_actions ORDER BY id")?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, payload)| {
                let mut action: PendingAction = serde_json::from_str(&payload)?;
                action.id = id;
                Ok(action)
            })
            .collect()
    }

    fn remove(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM pending_actions WHERE id = ?1", [id])? > 0)
    }
}

/// In-process queue
#[derive(Debug, Default)]
pub struct MemorySyncQueue {
    inner: Mutex<(i64, BTreeMap<i64, PendingAction>)>,
}

impl MemorySyncQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SyncQueue for MemorySyncQueue {
    fn enqueue(&self, action: &PendingAction) -> Result<i64> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| CacheError::Io("sync queue lock poisoned".to_string()))?;
        guard.0 += 1;
        let id = guard.0;
        let mut action = action.clone();
        action.id = id;
        guard.1.insert(id, action);
        Ok(id)
    }

    fn pending(&self) -> Result<Vec<PendingAction>> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| CacheError::Io("sync queue lock poisoned".to_string()))?;
        Ok(guard.1.values().cloned().collect())
    }

    fn remove(&self, id: i64) -> Result<bool> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| CacheError::Io("sync queue lock poisoned".to_string()))?;
        Ok(guard.1.remove(&id).is_some())
    }
}
