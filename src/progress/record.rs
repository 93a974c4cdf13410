//! Progress documents and the merge rule applied on every write

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a progress document: one per user, course and video.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressKey {
    pub user_id: String,
    pub course_id: String,
    pub video_id: String,
}

impl ProgressKey {
    pub fn new(
        user_id: impl Into<String>,
        course_id: impl Into<String>,
        video_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            course_id: course_id.into(),
            video_id: video_id.into(),
        }
    }
}

impl fmt::Display for ProgressKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.user_id, self.course_id, self.video_id)
    }
}

/// Stored watch progress for one video.
///
/// `watched_seconds` is a high-water mark and never decreases;
/// `last_position` is the playhead and may go backwards. `updated_at` is
/// assigned by the store; it is `None` while a write is still in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    #[serde(flatten)]
    pub key: ProgressKey,
    pub watched_seconds: f64,
    pub last_position: f64,
    #[serde(default)]
    pub total_seconds: f64,
    pub is_completed: bool,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A write from a playback session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub watched_seconds: f64,
    pub last_position: f64,
    pub total_seconds: f64,
    pub is_completed: bool,
}

impl ProgressRecord {
    /// Merge an update into the existing document (if any).
    ///
    /// Watched time keeps the maximum, completion is sticky and the playhead
    /// and timestamp always take the new values.
    pub fn merged(
        key: &ProgressKey,
        existing: Option<&ProgressRecord>,
        update: &ProgressUpdate,
        now: DateTime<Utc>,
    ) -> ProgressRecord {
        let (watched, completed, total) = match existing {
            Some(prev) => (
                prev.watched_seconds.max(update.watched_seconds),
                prev.is_completed || update.is_completed,
                if update.total_seconds > 0.0 {
                    update.total_seconds
                } else {
                    prev.total_seconds
                },
            ),
            None => (
                update.watched_seconds,
                update.is_completed,
                update.total_seconds,
            ),
        };

        ProgressRecord {
            key: key.clone(),
            watched_seconds: watched.max(0.0),
            last_position: update.last_position.max(0.0),
            total_seconds: total.max(0.0),
            is_completed: completed,
            updated_at: Some(now),
        }
    }

    /// Percentage watched (0-100), if the duration is known
    pub fn percent_watched(&self) -> Option<f64> {
        (self.total_seconds > 0.0)
            .then(|| (self.watched_seconds / self.total_seconds * 100.0).min(100.0))
    }
}
