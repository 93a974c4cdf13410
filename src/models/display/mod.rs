//! Display model implementations for table output

mod cache;
mod common;
mod progress;

pub use cache::{BucketDisplay, PendingDisplay, RouteDisplay};
pub use progress::{ProgressDisplay, StepDisplay, WeekDisplay};
