//! Watch progress: playback reconciliation and summaries
//!
//! A [`PlaybackSession`] runs the [`PlaybackMachine`] for one video and
//! persists its snapshots through a [`ProgressStore`]. The
//! [`SummaryAggregator`] follows a user's records and keeps a
//! [`ProgressSummary`] up to date.

pub mod aggregator;
pub mod machine;
pub mod record;
pub mod session;
pub mod store;
pub mod summary;

pub use aggregator::{SummaryAggregator, SummaryState};
pub use machine::{Effect, PlaybackEvent, PlaybackMachine, PlaybackState, Transition};
pub use record::{ProgressKey, ProgressRecord, ProgressUpdate};
pub use session::{PlaybackSession, SaveHealth, SessionSettings};
pub use store::{KeyField, MemoryProgressStore, ProgressStore, SqliteProgressStore, Subscription};
pub use summary::{ProgressSummary, WeeklyProgress, summarize};
