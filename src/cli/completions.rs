//! Dynamic shell completions for flixcore
//!
//! Completes user, course and video IDs from the local progress database.
//! Completers run synchronously inside the shell, so every failure yields
//! no candidates instead of an error.

use clap_complete::engine::{ArgValueCandidates, CompletionCandidate};

use crate::clock::system_clock;
use crate::config::Config;
use crate::progress::{KeyField, SqliteProgressStore};

/// Maximum number of completion candidates to return
const MAX_COMPLETIONS: usize = 25;

fn local_store() -> Option<SqliteProgressStore> {
    let config = Config::load_at(std::env::var("FLIXCORE_CONFIG").ok().as_deref()).ok()?;
    let path = match config.progress.db_path {
        Some(path) => path,
        None => SqliteProgressStore::default_path().ok()?,
    };
    if !path.exists() {
        return None;
    }
    SqliteProgressStore::open_at(&path, system_clock()).ok()
}

fn complete(field: KeyField) -> Vec<CompletionCandidate> {
    let Some(store) = local_store() else {
        return Vec::new();
    };
    store
        .distinct(field)
        .unwrap_or_default()
        .into_iter()
        .take(MAX_COMPLETIONS)
        .map(CompletionCandidate::new)
        .collect()
}

pub fn complete_user_ids() -> Vec<CompletionCandidate> {
    complete(KeyField::User)
}

pub fn complete_course_ids() -> Vec<CompletionCandidate> {
    complete(KeyField::Course)
}

pub fn complete_video_ids() -> Vec<CompletionCandidate> {
    complete(KeyField::Video)
}

pub fn user_id_candidates() -> ArgValueCandidates {
    ArgValueCandidates::new(complete_user_ids)
}

pub fn course_id_candidates() -> ArgValueCandidates {
    ArgValueCandidates::new(complete_course_ids)
}

pub fn video_id_candidates() -> ArgValueCandidates {
    ArgValueCandidates::new(complete_video_ids)
}
