//! Playback state machine
//!
//! Pure transition logic for one video: `transition(event)` returns the new
//! state and the side effects the caller must perform (seek the player,
//! start or stop the autosave timer, persist a snapshot, report completion).
//! No I/O happens here.

use serde::Serialize;

use super::record::{ProgressRecord, ProgressUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
    Ended,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Ended => "ended",
        }
    }
}

/// Player events fed into the machine
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackEvent {
    Play,
    Pause,
    /// Playhead moved; `duration` is 0 until metadata is known
    TimeUpdate { current_time: f64, duration: f64 },
    /// Autosave interval fired
    Tick,
    Ended,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Seek(f64),
    StartAutosave,
    StopAutosave,
    Persist(ProgressUpdate),
    /// The video just became completed in this session
    Completed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: PlaybackState,
    pub to: PlaybackState,
    pub effects: Vec<Effect>,
}

/// Watch-progress state machine for a single video session
#[derive(Debug, Clone)]
pub struct PlaybackMachine {
    state: PlaybackState,
    threshold: f64,
    watched: f64,
    position: f64,
    duration: f64,
    completed: bool,
    resume_from: Option<f64>,
}

impl PlaybackMachine {
    /// New session, seeded from the stored record if there is one.
    ///
    /// An unfinished record resumes at its last position. A completed
    /// record replays from the start; its watched time and completion are
    /// kept since the store never lowers them.
    pub fn new(threshold: f64, existing: Option<&ProgressRecord>) -> Self {
        let (watched, duration, completed, resume_from) = match existing {
            Some(r) => (
                r.watched_seconds,
                r.total_seconds,
                r.is_completed,
                (!r.is_completed && r.last_position > 0.0).then_some(r.last_position),
            ),
            None => (0.0, 0.0, false, None),
        };

        Self {
            state: PlaybackState::Idle,
            threshold,
            watched,
            position: 0.0,
            duration,
            completed,
            resume_from,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn watched(&self) -> f64 {
        self.watched
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    /// Current values as a write
    pub fn snapshot(&self) -> ProgressUpdate {
        ProgressUpdate {
            watched_seconds: self.watched,
            last_position: self.position,
            total_seconds: self.duration,
            is_completed: self.completed,
        }
    }

    pub fn transition(&mut self, event: PlaybackEvent) -> Transition {
        use PlaybackEvent as Ev;
        use PlaybackState as St;

        let from = self.state;
        let mut effects = Vec::new();

        match (from, event) {
            (St::Idle, Ev::Play) => {
                if let Some(position) = self.resume_from.take() {
                    self.position = position;
                    effects.push(Effect::Seek(position));
                }
                self.state = St::Playing;
                effects.push(Effect::StartAutosave);
            }
            (St::Paused, Ev::Play) => {
                self.state = St::Playing;
                effects.push(Effect::StartAutosave);
            }
            (St::Playing, Ev::TimeUpdate { current_time, duration }) => {
                self.observe(current_time, duration);
                self.watched = self.watched.max(self.position);
                if !self.completed
                    && self.duration > 0.0
                    && self.position >= self.duration * self.threshold
                {
                    self.completed = true;
                    effects.push(Effect::Persist(self.snapshot()));
                    effects.push(Effect::Completed);
                }
            }
            (St::Idle | St::Paused, Ev::TimeUpdate { current_time, duration }) => {
                // Seeking while stopped moves the playhead without counting as watched
                self.observe(current_time, duration);
            }
            (St::Playing, Ev::Tick) => {
                effects.push(Effect::Persist(self.snapshot()));
            }
            (St::Playing, Ev::Pause) => {
                self.state = St::Paused;
                effects.push(Effect::StopAutosave);
                effects.push(Effect::Persist(self.snapshot()));
            }
            (St::Playing | St::Paused, Ev::Ended) => {
                if from == St::Playing {
                    effects.push(Effect::StopAutosave);
                }
                if self.duration > 0.0 {
                    self.position = self.duration;
                }
                self.watched = self.watched.max(self.position);
                let newly_completed = !self.completed;
                self.completed = true;
                self.state = St::Ended;
                effects.push(Effect::Persist(self.snapshot()));
                if newly_completed {
                    effects.push(Effect::Completed);
                }
            }
            // Stale ticks, duplicate plays/pauses and anything after Ended
            _ => {}
        }

        Transition {
            from,
            to: self.state,
            effects,
        }
    }

    fn observe(&mut self, current_time: f64, duration: f64) {
        if current_time.is_finite() {
            self.position = current_time.max(0.0);
        }
        if duration.is_finite() && duration > 0.0 {
            self.duration = duration;
        }
    }
}
