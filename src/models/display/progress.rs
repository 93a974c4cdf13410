//! Progress record and weekly summary display models

use serde::Serialize;
use tabled::Tabled;

use super::common::check;
use crate::output::formatters::{
    format_date_range, format_duration, format_percent, format_timestamp_local,
};
use crate::progress::{Effect, PlaybackEvent, ProgressRecord, Transition, WeeklyProgress};

/// One watched video
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct ProgressDisplay {
    #[tabled(rename = "COURSE")]
    pub course: String,

    #[tabled(rename = "VIDEO")]
    pub video: String,

    #[tabled(rename = "WATCHED")]
    pub watched: String,

    #[tabled(rename = "POSITION")]
    pub position: String,

    #[tabled(rename = "%")]
    pub percent: String,

    #[tabled(rename = "DONE")]
    pub completed: String,

    #[tabled(rename = "UPDATED")]
    pub updated: String,
}

impl From<&ProgressRecord> for ProgressDisplay {
    fn from(record: &ProgressRecord) -> Self {
        Self {
            course: record.key.course_id.clone(),
            video: record.key.video_id.clone(),
            watched: format_duration(record.watched_seconds),
            position: format_duration(record.last_position),
            percent: format_percent(record.percent_watched()),
            completed: check(record.is_completed),
            updated: format_timestamp_local(record.updated_at.as_ref()),
        }
    }
}

/// One week of the summary, newest week labelled `this week`
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct WeekDisplay {
    #[tabled(rename = "WEEK")]
    pub week: String,

    #[tabled(rename = "DATES")]
    pub dates: String,

    #[tabled(rename = "MINUTES")]
    pub minutes: String,

    #[tabled(rename = "COMPLETED")]
    pub completed: u32,
}

impl From<&WeeklyProgress> for WeekDisplay {
    fn from(week: &WeeklyProgress) -> Self {
        let label = match week.weeks_ago {
            0 => "this week".to_string(),
            1 => "1 week ago".to_string(),
            n => format!("{} weeks ago", n),
        };
        Self {
            week: label,
            dates: format_date_range(&week.start, &week.end),
            minutes: format!("{:.1}", week.minutes_watched),
            completed: week.videos_completed,
        }
    }
}

/// One replayed player event in `progress simulate`
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct StepDisplay {
    #[tabled(rename = "#")]
    pub step: usize,

    #[tabled(rename = "EVENT")]
    pub event: String,

    #[tabled(rename = "STATE")]
    pub state: String,

    #[tabled(rename = "EFFECTS")]
    pub effects: String,
}

impl StepDisplay {
    pub fn new(step: usize, event: &PlaybackEvent, transition: &Transition) -> Self {
        let event = match event {
            PlaybackEvent::Play => "play".to_string(),
            PlaybackEvent::Pause => "pause".to_string(),
            PlaybackEvent::Tick => "tick".to_string(),
            PlaybackEvent::Ended => "ended".to_string(),
            PlaybackEvent::TimeUpdate { current_time, .. } => format!("@{}", current_time),
        };
        let state = if transition.from == transition.to {
            transition.to.as_str().to_string()
        } else {
            format!("{} → {}", transition.from.as_str(), transition.to.as_str())
        };
        let effects = transition
            .effects
            .iter()
            .map(|effect| match effect {
                Effect::Seek(to) => format!("seek {}", format_duration(*to)),
                Effect::StartAutosave => "autosave on".to_string(),
                Effect::StopAutosave => "autosave off".to_string(),
                Effect::Persist(update) => {
                    format!("save {}", format_duration(update.watched_seconds))
                }
                Effect::Completed => "completed".to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ");

        Self {
            step,
            event,
            state,
            effects,
        }
    }
}
