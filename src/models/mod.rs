//! Display models for CLI output
//!
//! Converts cache and progress types into table rows with CLI-friendly
//! column names.

pub mod display;

pub use display::{
    BucketDisplay, PendingDisplay, ProgressDisplay, RouteDisplay, StepDisplay, WeekDisplay,
};
