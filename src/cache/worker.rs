//! Worker event plumbing
//!
//! Browser lifecycle events arrive as [`WorkerEvent`] values and are routed
//! to the controller, the sync queue or the host. The host abstracts the
//! parts of the browser the worker talks back to (clients, notifications,
//! the waiting/active lifecycle).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use super::bucket::Bucket;
use super::controller::{ActivateReport, CacheController, InstallReport};
use super::fetch::Fetcher;
use super::http::{Request, Response};
use super::notify::{ClickDecision, ClientWindow, Notification, resolve_click};
use super::storage::CacheStore;
use super::sync::{BACKGROUND_SYNC_TAG, SyncQueue, SyncReport, drain};
use crate::error::{FetchError, Result};

/// Messages a page can post to the worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Activate a waiting worker now
    SkipWaiting,
    /// Evict one URL from a bucket
    CacheUpdate { url: String, bucket: Bucket },
}

/// Lifecycle and functional events
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(Request),
    Sync { tag: String },
    Push { payload: Option<Vec<u8>> },
    NotificationClick {
        action: Option<String>,
        url: Option<String>,
    },
    Message(WorkerMessage),
}

/// What handling an event produced
#[derive(Debug)]
pub enum EventOutcome {
    Installed(InstallReport),
    Activated(ActivateReport),
    Fetched(std::result::Result<Response, FetchError>),
    Synced(SyncReport),
    Notified(Notification),
    Clicked(ClickDecision),
    SkippedWaiting,
    Evicted { removed: bool },
    /// Event not handled (e.g. unknown sync tag)
    Ignored,
}

/// The browser side the worker calls back into
#[async_trait]
pub trait WorkerHost: Send + Sync {
    /// Let a waiting worker take over without waiting for old tabs
    async fn skip_waiting(&self);

    /// Take control of every open client without a reload
    async fn claim_clients(&self);

    async fn clients(&self) -> Vec<ClientWindow>;

    async fn focus_client(&self, client_id: &str);

    async fn open_window(&self, url: &str);

    async fn show_notification(&self, notification: &Notification);
}

/// Entry point for dispatched events
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome>;
}

/// The offline worker: controller + sync queue + host
pub struct ServiceWorker<F, S, Q, H>
where
    F: Fetcher,
    S: CacheStore,
    Q: SyncQueue,
    H: WorkerHost,
{
    controller: CacheController<F, S>,
    queue: Arc<Q>,
    host: Arc<H>,
}

impl<F, S, Q, H> ServiceWorker<F, S, Q, H>
where
    F: Fetcher,
    S: CacheStore,
    Q: SyncQueue,
    H: WorkerHost,
{
    pub fn new(controller: CacheController<F, S>, queue: Arc<Q>, host: Arc<H>) -> Self {
        Self {
            controller,
            queue,
            host,
        }
    }

    pub fn controller(&self) -> &CacheController<F, S> {
        &self.controller
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// Precache, then skip waiting
    pub async fn on_install(&self) -> Result<InstallReport> {
        let report = self.controller.install().await?;
        self.host.skip_waiting().await;
        Ok(report)
    }

    /// Prune old caches, then claim every client
    pub async fn on_activate(&self) -> Result<ActivateReport> {
        let report = self.controller.activate()?;
        self.host.claim_clients().await;
        Ok(report)
    }

    pub async fn on_sync(&self, tag: &str) -> Result<Option<SyncReport>> {
        if tag != BACKGROUND_SYNC_TAG {
            log::debug!("Ignoring sync tag {}", tag);
            return Ok(None);
        }
        let report = drain(self.queue.as_ref(), self.controller.fetcher()).await?;
        log::info!(
            "Background sync: {} replayed, {} failed, {} dropped, {} remaining",
            report.replayed,
            report.failed,
            report.dropped,
            report.remaining
        );
        Ok(Some(report))
    }

    pub async fn on_push(&self, payload: Option<&[u8]>) -> Notification {
        let notification = Notification::from_push(payload);
        self.host.show_notification(&notification).await;
        notification
    }

    pub async fn on_notification_click(
        &self,
        action: Option<&str>,
        url: Option<&str>,
    ) -> ClickDecision {
        let clients = self.host.clients().await;
        let decision = resolve_click(action, url, self.controller.policy().origin(), &clients);
        match &decision {
            ClickDecision::Dismiss => {}
            ClickDecision::Focus { client_id } => self.host.focus_client(client_id).await,
            ClickDecision::Open { url } => self.host.open_window(url).await,
        }
        decision
    }

    pub async fn on_message(&self, message: WorkerMessage) -> Result<EventOutcome> {
        match message {
            WorkerMessage::SkipWaiting => {
                self.host.skip_waiting().await;
                Ok(EventOutcome::SkippedWaiting)
            }
            WorkerMessage::CacheUpdate { url, bucket } => {
                let removed = self.controller.evict(bucket, &url)?;
                Ok(EventOutcome::Evicted { removed })
            }
        }
    }
}

#[async_trait]
impl<F, S, Q, H> EventHandler for ServiceWorker<F, S, Q, H>
where
    F: Fetcher,
    S: CacheStore,
    Q: SyncQueue,
    H: WorkerHost,
{
    async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome> {
        match event {
            WorkerEvent::Install => Ok(EventOutcome::Installed(self.on_install().await?)),
            WorkerEvent::Activate => Ok(EventOutcome::Activated(self.on_activate().await?)),
            WorkerEvent::Fetch(request) => Ok(EventOutcome::Fetched(
                self.controller.handle_fetch(&request).await,
            )),
            WorkerEvent::Sync { tag } => Ok(match self.on_sync(&tag).await? {
                Some(report) => EventOutcome::Synced(report),
                None => EventOutcome::Ignored,
            }),
            WorkerEvent::Push { payload } => {
                Ok(EventOutcome::Notified(self.on_push(payload.as_deref()).await))
            }
            WorkerEvent::NotificationClick { action, url } => Ok(EventOutcome::Clicked(
                self.on_notification_click(action.as_deref(), url.as_deref())
                    .await,
            )),
            WorkerEvent::Message(message) => self.on_message(message).await,
        }
    }
}

/// Host for running the worker outside a browser: lifecycle calls are
/// logged, notifications are kept for inspection and windows are tracked.
#[derive(Debug, Default)]
pub struct HeadlessHost {
    state: Mutex<HeadlessState>,
}

#[derive(Debug, Default)]
struct HeadlessState {
    skipped_waiting: bool,
    claimed: bool,
    clients: Vec<ClientWindow>,
    focused: Vec<String>,
    notifications: Vec<Notification>,
}

impl HeadlessHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clients(clients: Vec<ClientWindow>) -> Self {
        let host = Self::default();
        if let Ok(mut state) = host.state.lock() {
            state.clients = clients;
        }
        host
    }

    pub fn skipped_waiting(&self) -> bool {
        self.state.lock().map(|s| s.skipped_waiting).unwrap_or(false)
    }

    pub fn claimed(&self) -> bool {
        self.state.lock().map(|s| s.claimed).unwrap_or(false)
    }

    pub fn focused(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.focused.clone())
            .unwrap_or_default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.state
            .lock()
            .map(|s| s.notifications.clone())
            .unwrap_or_default()
    }

    pub fn open_urls(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.clients.iter().map(|c| c.url.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl WorkerHost for HeadlessHost {
    async fn skip_waiting(&self) {
        log::info!("Worker skipped waiting");
        if let Ok(mut state) = self.state.lock() {
            state.skipped_waiting = true;
        }
    }

    async fn claim_clients(&self) {
        log::info!("Worker claimed clients");
        if let Ok(mut state) = self.state.lock() {
            state.claimed = true;
        }
    }

    async fn clients(&self) -> Vec<ClientWindow> {
        self.state
            .lock()
            .map(|s| s.clients.clone())
            .unwrap_or_default()
    }

    async fn focus_client(&self, client_id: &str) {
        log::info!("Focusing client {}", client_id);
        if let Ok(mut state) = self.state.lock() {
            state.focused.push(client_id.to_string());
        }
    }

    async fn open_window(&self, url: &str) {
        log::info!("Opening window at {}", url);
        if let Ok(mut state) = self.state.lock() {
            let id = format!("window-{}", state.clients.len() + 1);
            state.clients.push(ClientWindow {
                id,
                url: url.to_string(),
            });
        }
    }

    async fn show_notification(&self, notification: &Notification) {
        log::info!("Notification: {} - {}", notification.title, notification.body);
        if let Ok(mut state) = self.state.lock() {
            state.notifications.push(notification.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::fetch::testing::ScriptedFetcher;
    use crate::cache::memory::MemoryCacheStore;
    use crate::cache::sync::{MemorySyncQueue, PendingAction};
    use crate::clock::system_clock;
    use crate::config::CacheSettings;
    use reqwest::Method;

    type TestWorker = ServiceWorker<ScriptedFetcher, MemoryCacheStore, MemorySyncQueue, HeadlessHost>;

    fn worker_with(host: HeadlessHost) -> (TestWorker, Arc<ScriptedFetcher>, Arc<HeadlessHost>) {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let store = Arc::new(MemoryCacheStore::new());
        let controller =
            CacheController::new(fetcher.clone(), store, &CacheSettings::default(), system_clock())
                .unwrap();
        let host = Arc::new(host);
        let worker = ServiceWorker::new(controller, Arc::new(MemorySyncQueue::new()), host.clone());
        (worker, fetcher, host)
    }

    #[tokio::test]
    async fn test_install_skips_waiting_after_precache() {
        let (worker, fetcher, host) = worker_with(HeadlessHost::new());
        for path in CacheSettings::default().precache {
            fetcher.respond(&format!("http://localhost:3000{}", path), Response::new(200, "x"));
        }

        let outcome = worker.dispatch(WorkerEvent::Install).await.unwrap();

        assert!(matches!(outcome, EventOutcome::Installed(_)));
        assert!(host.skipped_waiting());
    }

    #[tokio::test]
    async fn test_failed_install_does_not_skip_waiting() {
        let (worker, fetcher, host) = worker_with(HeadlessHost::new());
        fetcher.set_offline(true);

        assert!(worker.dispatch(WorkerEvent::Install).await.is_err());
        assert!(!host.skipped_waiting());
    }

    #[tokio::test]
    async fn test_activate_claims_clients() {
        let (worker, _fetcher, host) = worker_with(HeadlessHost::new());

        let outcome = worker.dispatch(WorkerEvent::Activate).await.unwrap();

        assert!(matches!(outcome, EventOutcome::Activated(_)));
        assert!(host.claimed());
    }

    #[tokio::test]
    async fn test_skip_waiting_message() {
        let (worker, _fetcher, host) = worker_with(HeadlessHost::new());

        let outcome = worker
            .dispatch(WorkerEvent::Message(WorkerMessage::SkipWaiting))
            .await
            .unwrap();

        assert!(matches!(outcome, EventOutcome::SkippedWaiting));
        assert!(host.skipped_waiting());
    }

    #[tokio::test]
    async fn test_cache_update_message_evicts() {
        let (worker, fetcher, _host) = worker_with(HeadlessHost::new());
        fetcher.respond("http://localhost:3000/course/7", Response::new(200, "c7"));
        worker
            .dispatch(WorkerEvent::Fetch(
                Request::get("http://localhost:3000/course/7").unwrap(),
            ))
            .await
            .unwrap();

        let outcome = worker
            .dispatch(WorkerEvent::Message(WorkerMessage::CacheUpdate {
                url: "/course/7".to_string(),
                bucket: Bucket::Dynamic,
            }))
            .await
            .unwrap();

        assert!(matches!(outcome, EventOutcome::Evicted { removed: true }));
    }

    #[test]
    fn test_message_wire_format() {
        let msg: WorkerMessage = serde_json::from_str(
            r#"{"type":"CACHE_UPDATE","url":"/api/user","bucket":"dynamic"}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            WorkerMessage::CacheUpdate {
                url: "/api/user".to_string(),
                bucket: Bucket::Dynamic
            }
        );
        let skip: WorkerMessage = serde_json::from_str(r#"{"type":"SKIP_WAITING"}"#).unwrap();
        assert_eq!(skip, WorkerMessage::SkipWaiting);
    }

    #[tokio::test]
    async fn test_sync_drains_only_for_known_tag() {
        let (worker, fetcher, _host) = worker_with(HeadlessHost::new());
        fetcher.respond("http://localhost:3000/api/progress", Response::new(200, "{}"));
        worker
            .queue()
            .enqueue(&PendingAction::new(
                Method::POST,
                "http://localhost:3000/api/progress",
                Some(b"{}".to_vec()),
                chrono::Utc::now(),
            ))
            .unwrap();

        let ignored = worker
            .dispatch(WorkerEvent::Sync {
                tag: "other".to_string(),
            })
            .await
            .unwrap();
        assert!(matches!(ignored, EventOutcome::Ignored));
        assert_eq!(worker.queue().pending().unwrap().len(), 1);

        let synced = worker
            .dispatch(WorkerEvent::Sync {
                tag: BACKGROUND_SYNC_TAG.to_string(),
            })
            .await
            .unwrap();
        match synced {
            EventOutcome::Synced(report) => assert_eq!(report.replayed, 1),
            other => panic!("Expected Synced, got {:?}", other),
        }
        assert!(worker.queue().pending().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_push_shows_notification() {
        let (worker, _fetcher, host) = worker_with(HeadlessHost::new());

        worker
            .dispatch(WorkerEvent::Push {
                payload: Some(br#"{"body":"Nova aula publicada"}"#.to_vec()),
            })
            .await
            .unwrap();

        let shown = host.notifications();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].body, "Nova aula publicada");
    }

    #[tokio::test]
    async fn test_notification_click_focuses_or_opens() {
        let (worker, _fetcher, host) = worker_with(HeadlessHost::with_clients(vec![ClientWindow {
            id: "tab-1".to_string(),
            url: "http://localhost:3000/app".to_string(),
        }]));

        worker
            .dispatch(WorkerEvent::NotificationClick {
                action: Some("explore".to_string()),
                url: Some("/app".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(host.focused(), vec!["tab-1".to_string()]);

        worker
            .dispatch(WorkerEvent::NotificationClick {
                action: None,
                url: Some("/course/3".to_string()),
            })
            .await
            .unwrap();
        assert!(
            host.open_urls()
                .contains(&"http://localhost:3000/course/3".to_string())
        );
    }
}
