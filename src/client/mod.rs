//! ComunidadeFlix API client
//!
//! Remote [`ProgressStore`](crate::progress::ProgressStore) implementation
//! for the `/api/progress` endpoints.

pub mod progress;
pub mod rate_limit;

pub use progress::HttpProgressStore;
