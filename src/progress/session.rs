//! Playback session: the state machine wired to a store and a timer
//!
//! Each session owns one writer task that performs its writes in order,
//! and at most one autosave task that fires `Tick` every save interval
//! while playing. Both are bound to the session's key when spawned, so a
//! timer left over from a previous video can never write into another.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::machine::{Effect, PlaybackEvent, PlaybackMachine, PlaybackState, Transition};
use super::record::{ProgressKey, ProgressUpdate};
use super::store::ProgressStore;
use crate::config::ProgressSettings;

/// Shortest autosave period; a zero period would stall the timer
const MIN_SAVE_INTERVAL: Duration = Duration::from_millis(100);

/// Tunables for a session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub completion_threshold: f64,
    pub save_interval: Duration,
    pub max_consecutive_failures: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&ProgressSettings::default())
    }
}

impl From<&ProgressSettings> for SessionSettings {
    fn from(settings: &ProgressSettings) -> Self {
        Self {
            completion_threshold: settings.completion_threshold,
            save_interval: settings.save_interval().max(MIN_SAVE_INTERVAL),
            max_consecutive_failures: settings.max_consecutive_failures.max(1),
        }
    }
}

/// Health of the session's writes, for surfacing persistent outages
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SaveHealth {
    Healthy,
    Failing {
        consecutive_failures: u32,
        last_error: String,
    },
}

type CompletionCallback = Box<dyn Fn(&ProgressKey) + Send + Sync>;

/// One video being watched
pub struct PlaybackSession {
    key: ProgressKey,
    machine: Arc<Mutex<PlaybackMachine>>,
    writes: Option<mpsc::UnboundedSender<ProgressUpdate>>,
    writer: Option<JoinHandle<()>>,
    autosave: Option<JoinHandle<()>>,
    save_interval: Duration,
    health: watch::Receiver<SaveHealth>,
    on_complete: Option<CompletionCallback>,
}

impl PlaybackSession {
    /// Load the stored record (if any) and get ready to play.
    ///
    /// A failed load starts the session from scratch; the store's merge
    /// rule keeps the earlier high-water mark once writes go through.
    pub async fn start(
        store: Arc<dyn ProgressStore>,
        key: ProgressKey,
        settings: &SessionSettings,
    ) -> Self {
        let existing = match store.get(&key).await {
            Ok(record) => record,
            Err(e) => {
                log::warn!("Could not load progress for {}: {}", key, e);
                None
            }
        };
        let machine = PlaybackMachine::new(settings.completion_threshold, existing.as_ref());

        let (tx, rx) = mpsc::unbounded_channel();
        let (health_tx, health_rx) = watch::channel(SaveHealth::Healthy);
        let writer = tokio::spawn(run_writer(
            store,
            key.clone(),
            rx,
            health_tx,
            settings.max_consecutive_failures,
        ));

        Self {
            key,
            machine: Arc::new(Mutex::new(machine)),
            writes: Some(tx),
            writer: Some(writer),
            autosave: None,
            save_interval: settings.save_interval,
            health: health_rx,
            on_complete: None,
        }
    }

    /// Called once when the video becomes completed
    pub fn on_complete(mut self, callback: impl Fn(&ProgressKey) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub fn key(&self) -> &ProgressKey {
        &self.key
    }

    pub fn state(&self) -> PlaybackState {
        lock(&self.machine).state()
    }

    pub fn snapshot(&self) -> ProgressUpdate {
        lock(&self.machine).snapshot()
    }

    pub fn health(&self) -> watch::Receiver<SaveHealth> {
        self.health.clone()
    }

    /// Feed a player event and carry out its effects. The returned
    /// transition still lists every effect; the caller handles `Seek`.
    pub fn apply(&mut self, event: PlaybackEvent) -> Transition {
        let transition = lock(&self.machine).transition(event);

        for effect in &transition.effects {
            match effect {
                Effect::StartAutosave => self.start_autosave(),
                Effect::StopAutosave => self.stop_autosave(),
                Effect::Persist(update) => self.persist(update.clone()),
                Effect::Completed => {
                    log::info!("Completed {}", self.key);
                    if let Some(callback) = &self.on_complete {
                        callback(&self.key);
                    }
                }
                Effect::Seek(_) => {}
            }
        }

        transition
    }

    /// Stop the timer and wait for queued writes to land.
    pub async fn close(mut self) {
        self.stop_autosave();
        self.writes = None;
        if let Some(writer) = self.writer.take()
            && let Err(e) = writer.await
        {
            log::warn!("Progress writer for {} stopped abnormally: {}", self.key, e);
        }
    }

    fn persist(&self, update: ProgressUpdate) {
        if let Some(writes) = &self.writes
            && writes.send(update).is_err()
        {
            log::warn!("Progress writer for {} is gone, dropping write", self.key);
        }
    }

    fn start_autosave(&mut self) {
        self.stop_autosave();
        let Some(writes) = self.writes.clone() else {
            return;
        };
        let machine = self.machine.clone();
        let period = self.save_interval.max(MIN_SAVE_INTERVAL);

        self.autosave = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let transition = lock(&machine).transition(PlaybackEvent::Tick);
                for effect in transition.effects {
                    if let Effect::Persist(update) = effect
                        && writes.send(update).is_err()
                    {
                        return;
                    }
                }
            }
        }));
    }

    fn stop_autosave(&mut self) {
        if let Some(task) = self.autosave.take() {
            task.abort();
        }
    }
}

impl Drop for PlaybackSession {
    /// Cancels the timer only; writes already queued still complete.
    fn drop(&mut self) {
        self.stop_autosave();
    }
}

fn lock(machine: &Mutex<PlaybackMachine>) -> MutexGuard<'_, PlaybackMachine> {
    machine.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Apply queued writes in order. Snapshots are cumulative, so when several
/// are waiting only the newest is sent.
async fn run_writer(
    store: Arc<dyn ProgressStore>,
    key: ProgressKey,
    mut rx: mpsc::UnboundedReceiver<ProgressUpdate>,
    health: watch::Sender<SaveHealth>,
    max_consecutive_failures: u32,
) {
    let mut failures: u32 = 0;

    while let Some(mut update) = rx.recv().await {
        while let Ok(newer) = rx.try_recv() {
            update = newer;
        }

        match store.upsert(&key, &update).await {
            Ok(_) => {
                if failures > 0 {
                    log::info!("Progress writes for {} recovered after {} failures", key, failures);
                }
                failures = 0;
                health.send_if_modified(|h| {
                    let changed = *h != SaveHealth::Healthy;
                    *h = SaveHealth::Healthy;
                    changed
                });
            }
            Err(e) => {
                failures += 1;
                log::warn!("Failed to save progress for {} ({} in a row): {}", key, failures, e);
                if failures >= max_consecutive_failures {
                    health.send_replace(SaveHealth::Failing {
                        consecutive_failures: failures,
                        last_error: e.to_string(),
                    });
                }
            }
        }
    }
}
