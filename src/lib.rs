//! flixcore - offline cache controller and watch-progress engine for the
//! ComunidadeFlix course platform
//!
//! - [`cache`]: request routing, versioned buckets, network-first fetching
//!   with offline fallbacks, background sync and worker events.
//! - [`progress`]: the playback state machine, autosaving sessions, progress
//!   stores and the live summary aggregator.
//! - [`client`]: the REST-backed progress store.

pub mod cache;
pub mod cli;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod output;
pub mod progress;
