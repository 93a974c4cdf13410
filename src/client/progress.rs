//! Remote progress store over the ComunidadeFlix REST API

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use super::rate_limit::{EndpointCategory, RateLimiterSet};
use crate::config::ApiSettings;
use crate::error::{ConfigError, StoreError};
use crate::progress::{ProgressKey, ProgressRecord, ProgressStore, ProgressUpdate, Subscription};

type Result<T> = std::result::Result<T, StoreError>;

/// Progress store backed by `/api/progress`
#[derive(Clone)]
pub struct HttpProgressStore {
    http: HttpClient,
    base_url: Url,
    token: Option<String>,
    limiters: Arc<RateLimiterSet>,
    poll_interval: Duration,
}

impl HttpProgressStore {
    pub fn new(base_url: &str, token: Option<String>, poll_interval: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| StoreError::InvalidResponse(format!("Invalid API URL {}: {}", base_url, e)))?;
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("flixcore/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url,
            token,
            limiters: Arc::new(RateLimiterSet::new()),
            poll_interval,
        })
    }

    pub fn from_settings(settings: &ApiSettings) -> crate::error::Result<Self> {
        let base_url = settings
            .base_url
            .as_deref()
            .ok_or(ConfigError::MissingApiUrl)?;
        Ok(Self::new(
            base_url,
            settings.token.clone(),
            Duration::from_secs(settings.poll_interval_secs.max(1)),
        )?)
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidResponse(format!("Cannot use {} as a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn record_url(&self, key: &ProgressKey) -> Result<Url> {
        self.url(&["api", "progress", &key.user_id, &key.course_id, &key.video_id])
    }

    fn list_url(&self, user_id: &str) -> Result<Url> {
        let mut url = self.url(&["api", "progress"])?;
        url.query_pairs_mut().append_pair("userId", user_id);
        Ok(url)
    }

    /// Send a request and decode a 2xx body. `Ok(None)` for 404.
    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&ProgressUpdate>,
    ) -> Result<Option<T>> {
        let category = EndpointCategory::from_request(url.path(), &method);
        self.limiters.wait_for(category).await;

        let mut request = self.http.request(method.clone(), url.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        log::debug!("{} {}", method, url);
        let response = request.send().await?;
        let status = response.status();

        match status {
            s if s.is_success() => {
                let data = response.json::<T>().await.map_err(|e| {
                    StoreError::InvalidResponse(format!("Failed to parse response: {}", e))
                })?;
                Ok(Some(data))
            }
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::TOO_MANY_REQUESTS => {
                self.limiters.activate(category);
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                Err(StoreError::RateLimit(Duration::from_secs(retry_after)))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(StoreError::ServerError(
                format!("{} {}: check api.token", status.as_u16(), url.path()),
            )),
            s if s.is_server_error() => {
                let text = response.text().await.unwrap_or_default();
                Err(StoreError::ServerError(format!("{}: {}", s.as_u16(), text)))
            }
            s => {
                let text = response.text().await.unwrap_or_default();
                Err(StoreError::InvalidResponse(format!(
                    "Unexpected status {}: {}",
                    s.as_u16(),
                    text
                )))
            }
        }
    }
}

#[async_trait]
impl ProgressStore for HttpProgressStore {
    async fn get(&self, key: &ProgressKey) -> Result<Option<ProgressRecord>> {
        self.send(Method::GET, self.record_url(key)?, None).await
    }

    async fn upsert(&self, key: &ProgressKey, update: &ProgressUpdate) -> Result<ProgressRecord> {
        self.send(Method::PUT, self.record_url(key)?, Some(update))
            .await?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn get_all(&self, user_id: &str) -> Result<Vec<ProgressRecord>> {
        Ok(self
            .send(Method::GET, self.list_url(user_id)?, None)
            .await?
            .unwrap_or_default())
    }

    /// Polls the list endpoint and emits whenever the set differs from the
    /// last one delivered. Errors are delivered and polling continues.
    async fn subscribe(&self, user_id: &str) -> Result<Subscription> {
        let store = self.clone();
        let user_id = user_id.to_string();
        let (tx, rx) = mpsc::channel(4);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(store.poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut last: Option<Vec<ProgressRecord>> = None;

            loop {
                interval.tick().await;
                let snapshot = store.get_all(&user_id).await;
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
    use mockito::Matcher;

    const RECORD: &str = r#"{
        "userId": "u1", "courseId": "c1", "videoId": "v1",
        "watchedSeconds": 120.0, "lastPosition": 90.0, "totalSeconds": 600.0,
        "isCompleted": false, "updatedAt": "2026-03-02T10:00:00Z"
    }"#;

    fn store(server: &mockito::Server) -> HttpProgressStore {
        HttpProgressStore::new(
            &server.url(),
            Some("secret".to_string()),
            Duration::from_millis(50),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_record_and_missing() {
        let mut server = mockito::Server::new_async().await;
        let _found = server
            .mock("GET", "/api/progress/u1/c1/v1")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_body(RECORD)
            .create_async()
            .await;
        let _missing = server
            .mock("GET", "/api/progress/u1/c1/v2")
            .with_status(404)
            .create_async()
            .await;

        let store = store(&server);
        let record = store
            .get(&ProgressKey::new("u1", "c1", "v1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.watched_seconds, 120.0);
        assert!(store.get(&ProgressKey::new("u1", "c1", "v2")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_sends_update() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/api/progress/u1/c1/v1")
            .match_body(Matcher::PartialJsonString(
                r#"{"watchedSeconds": 120.0, "isCompleted": false}"#.to_string(),
            ))
            .with_status(200)
            .with_body(RECORD)
            .create_async()
            .await;

        let record = store(&server)
            .upsert(
                &ProgressKey::new("u1", "c1", "v1"),
                &ProgressUpdate {
                    watched_seconds: 120.0,
                    last_position: 90.0,
                    total_seconds: 600.0,
                    is_completed: false,
                },
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(record.last_position, 90.0);
    }

    #[tokio::test]
    async fn test_get_all_and_malformed_timestamp() {
        let mut server = mockito::Server::new_async().await;
        let _ok = server
            .mock("GET", "/api/progress")
            .match_query(Matcher::UrlEncoded("userId".into(), "u1".into()))
            .with_status(200)
            .with_body(format!("[{}]", RECORD))
            .create_async()
            .await;
        let _bad = server
            .mock("GET", "/api/progress")
            .match_query(Matcher::UrlEncoded("userId".into(), "u2".into()))
            .with_status(200)
            .with_body(r#"[{"userId":"u2","courseId":"c1","videoId":"v1","watchedSeconds":1,"lastPosition":1,"isCompleted":false,"updatedAt":"last tuesday"}]"#)
            .create_async()
            .await;

        let store = store(&server);
        assert_eq!(store.get_all("u1").await.unwrap().len(), 1);
        let err = store.get_all("u2").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_rate_limit_activates_limiter() {
        let mut server = mockito::Server::new_async().await;
        let _limited = server
            .mock("PUT", "/api/progress/u1/c1/v1")
            .with_status(429)
            .with_header("retry-after", "7")
            .create_async()
            .await;

        let store = store(&server);
        let err = store
            .upsert(
                &ProgressKey::new("u1", "c1", "v1"),
                &ProgressUpdate {
                    watched_seconds: 1.0,
                    last_position: 1.0,
                    total_seconds: 0.0,
                    is_completed: false,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::RateLimit(d) if d == Duration::from_secs(7)));
        assert!(store.limiters.is_active(EndpointCategory::Write));
    }

    #[tokio::test]
    async fn test_server_error() {
        let mut server = mockito::Server::new_async().await;
        let _boom = server
            .mock("GET", "/api/progress/u1/c1/v1")
            .with_status(503)
            .with_body("maintenance")
            .create_async()
            .await;

        let err = store(&server)
            .get(&ProgressKey::new("u1", "c1", "v1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ServerError(_)));
    }

    #[tokio::test]
    async fn test_subscription_emits_only_on_change() {
        let mut server = mockito::Server::new_async().await;
        let _list = server
            .mock("GET", "/api/progress")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(format!("[{}]", RECORD))
            .expect_at_least(2)
            .create_async()
            .await;

        let mut sub = store(&server).subscribe("u1").await.unwrap();
        let first = sub.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 1);

        let quiet = tokio::time::timeout(Duration::from_millis(300), sub.next()).await;
        assert!(quiet.is_err());
    }

    #[test]
    fn test_from_settings_requires_url() {
        let err = HttpProgressStore::from_settings(&ApiSettings::default()).err().unwrap();
        assert!(matches!(
            err,
            crate::error::Error::Config(ConfigError::MissingApiUrl)
        ));
    }
}
