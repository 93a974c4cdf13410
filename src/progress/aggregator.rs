//! Live summary for one user
//!
//! Subscribes to the store and recomputes the summary on every snapshot.
//! Store errors become [`SummaryState::Failed`] without ending the
//! subscription; the next good snapshot recovers.

use chrono::FixedOffset;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::store::ProgressStore;
use super::summary::{ProgressSummary, summarize};
use crate::clock::SharedClock;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "summary", rename_all = "snake_case")]
pub enum SummaryState {
    Loading,
    /// No progress yet
    Empty,
    Ready(ProgressSummary),
    Failed(String),
}

pub struct SummaryAggregator {
    state: watch::Receiver<SummaryState>,
    task: JoinHandle<()>,
}

impl SummaryAggregator {
    /// Start following `user_id`. Calendar days use `offset`.
    pub fn start(
        store: Arc<dyn ProgressStore>,
        user_id: &str,
        clock: SharedClock,
        offset: FixedOffset,
    ) -> Self {
        let (tx, rx) = watch::channel(SummaryState::Loading);
        let user_id = user_id.to_string();

        let task = tokio::spawn(async move {
            let mut subscription = match store.subscribe(&user_id).await {
                Ok(sub) => sub,
                Err(e) => {
                    log::warn!("Could not subscribe to progress for {}: {}", user_id, e);
                    tx.send_replace(SummaryState::Failed(e.to_string()));
                    return;
                }
            };

            while let Some(snapshot) = subscription.next().await {
                let state = match snapshot {
                    Ok(records) => {
                        let now = clock.now().with_timezone(&offset);
                        match summarize(&records, &now) {
                            Some(summary) => SummaryState::Ready(summary),
                            None => SummaryState::Empty,
                        }
                    }
                    Err(e) => {
                        log::warn!("Progress snapshot for {} failed: {}", user_id, e);
                        SummaryState::Failed(e.to_string())
                    }
                };
                if tx.send(state).is_err() {
                    break;
                }
            }
            log::debug!("Summary subscription for {} ended", user_id);
        });

        Self { state: rx, task }
    }

    pub fn current(&self) -> SummaryState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SummaryState> {
        self.state.clone()
    }

    /// Wait for the next recomputation that is not `Loading`
    pub async fn settled(&mut self) -> SummaryState {
        let settled = self
            .state
            .wait_for(|s| !matches!(s, SummaryState::Loading))
            .await
            .map(|state| state.clone());
        settled.unwrap_or_else(|_| self.current())
    }
}

impl Drop for SummaryAggregator {
    /// Unsubscribes and discards any recomputation in flight
    fn drop(&mut self) {
        self.task.abort();
    }
}
