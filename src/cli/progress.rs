//! Watch-progress commands

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Local, Offset, Utc};
use colored::Colorize;
use serde::Serialize;

use crate::cli::{CommandContext, OutputFormat};
use crate::clock::{FixedClock, SharedClock, system_clock};
use crate::error::{Error, Result, StoreError};
use crate::models::{ProgressDisplay, StepDisplay, WeekDisplay};
use crate::output::{
    self,
    formatters::{format_duration, format_timestamp_local},
};
use crate::progress::{
    PlaybackEvent, PlaybackSession, ProgressKey, ProgressRecord, ProgressSummary, SaveHealth,
    SummaryAggregator, SummaryState, summarize,
};

/// Show one record
pub async fn show(ctx: &CommandContext, user: &str, course: &str, video: &str) -> Result<()> {
    let key = ProgressKey::new(user, course, video);
    let record = ctx
        .progress_store()?
        .get(&key)
        .await?
        .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

    match ctx.format {
        OutputFormat::Json => output::print_json(&record),
        OutputFormat::Table => output::print(&vec![ProgressDisplay::from(&record)], ctx.format),
        OutputFormat::Pretty => {
            print_record(&record);
            Ok(())
        }
    }
}

/// List every record of a user, most recent first
pub async fn list(ctx: &CommandContext, user: &str) -> Result<()> {
    let mut records = ctx.progress_store()?.get_all(user).await?;
    records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

    match ctx.format {
        OutputFormat::Json => output::print_json(&records),
        _ => {
            let rows: Vec<ProgressDisplay> = records.iter().map(ProgressDisplay::from).collect();
            output::print(&rows, ctx.format)
        }
    }
}

/// Reference time: `--at` keeps its own offset, otherwise local now
fn reference_time(at: Option<&str>) -> Result<DateTime<FixedOffset>> {
    match at {
        Some(at) => DateTime::parse_from_rfc3339(at)
            .map_err(|e| Error::InvalidArgument(format!("--at {}: {}", at, e))),
        None => {
            let now = Local::now();
            Ok(now.with_timezone(now.offset()))
        }
    }
}

/// Totals, trailing weeks and streaks for a user
pub async fn summary(ctx: &CommandContext, user: &str, at: Option<&str>, watch: bool) -> Result<()> {
    let now = reference_time(at)?;
    let store = ctx.progress_store()?;

    if !watch {
        let records = store.get_all(user).await?;
        let state = match summarize(&records, &now) {
            Some(summary) => SummaryState::Ready(summary),
            None => SummaryState::Empty,
        };
        return print_summary_state(ctx.format, user, &state);
    }

    // A pinned `--at` stays pinned while watching
    let clock: SharedClock = match at {
        Some(_) => Arc::new(FixedClock::new(now.with_timezone(&Utc))),
        None => system_clock(),
    };
    let aggregator = SummaryAggregator::start(store, user, clock, now.offset().fix());
    let mut states = aggregator.watch();

    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                if state != SummaryState::Loading {
                    print_summary_state(ctx.format, user, &state)?;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

fn print_summary_state(format: OutputFormat, user: &str, state: &SummaryState) -> Result<()> {
    match format {
        OutputFormat::Json => output::print_json(state),
        OutputFormat::Table => match state {
            SummaryState::Ready(summary) => {
                let weeks: Vec<WeekDisplay> =
                    summary.weekly_progress.iter().map(WeekDisplay::from).collect();
                output::print(&weeks, format)
            }
            _ => {
                println!("No results found.");
                Ok(())
            }
        },
        OutputFormat::Pretty => {
            match state {
                SummaryState::Loading => {}
                SummaryState::Empty => println!("No progress recorded for {} yet", user.bold()),
                SummaryState::Failed(e) => println!("{} Summary unavailable: {}", "✗".red(), e),
                SummaryState::Ready(summary) => print_summary(user, summary)?,
            }
            Ok(())
        }
    }
}

fn print_summary(user: &str, summary: &ProgressSummary) -> Result<()> {
    println!("{} {}", "Progress summary for".bold(), user.bold().cyan());
    println!("────────────────────────────────────────");
    println!(
        "Courses:        {} started, {} completed",
        summary.total_courses_started, summary.total_courses_completed
    );
    println!(
        "Videos:         {} watched, {} completed",
        summary.total_videos_watched, summary.total_videos_completed
    );
    println!("Watch time:     {}", format_duration(summary.total_watch_time));

    let streak = format!("{} days", summary.current_streak);
    let streak = if summary.current_streak > 0 {
        streak.green()
    } else {
        streak.dimmed()
    };
    println!(
        "Streak:         {} (longest {} days)",
        streak, summary.longest_streak
    );
    println!(
        "Last activity:  {}",
        format_timestamp_local(summary.last_activity.as_ref())
    );

    println!();
    let weeks: Vec<WeekDisplay> = summary.weekly_progress.iter().map(WeekDisplay::from).collect();
    output::print(&weeks, OutputFormat::Table)
}

fn print_record(record: &ProgressRecord) {
    println!("{}", record.key.to_string().bold());
    println!("────────────────────────────────────────");
    println!("Watched:        {}", format_duration(record.watched_seconds));
    println!("Position:       {}", format_duration(record.last_position));
    if record.total_seconds > 0.0 {
        println!("Duration:       {}", format_duration(record.total_seconds));
    }
    if record.is_completed {
        println!("Completed:      {}", "✓".green());
    } else {
        println!("Completed:      {}", "✗".dimmed());
    }
    println!(
        "Updated:        {}",
        format_timestamp_local(record.updated_at.as_ref())
    );
}

/// Parse one scripted player event. A bare number moves the playhead.
fn parse_event(token: &str, duration: f64) -> Result<PlaybackEvent> {
    match token.trim().to_lowercase().as_str() {
        "play" => Ok(PlaybackEvent::Play),
        "pause" => Ok(PlaybackEvent::Pause),
        "ended" | "end" => Ok(PlaybackEvent::Ended),
        "tick" => Ok(PlaybackEvent::Tick),
        other => other
            .parse::<f64>()
            .ok()
            .filter(|t| t.is_finite() && *t >= 0.0)
            .map(|current_time| PlaybackEvent::TimeUpdate {
                current_time,
                duration,
            })
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "Unknown event '{}' (expected play, pause, ended, tick or seconds)",
                    token
                ))
            }),
    }
}

#[derive(Serialize)]
struct SimulationReport {
    steps: Vec<StepDisplay>,
    health: SaveHealth,
    record: Option<ProgressRecord>,
}

/// Replay a scripted session through the reconciler and persist it
pub async fn simulate(
    ctx: &CommandContext,
    key: ProgressKey,
    duration: f64,
    events: &[String],
) -> Result<()> {
    if !(duration.is_finite() && duration > 0.0) {
        return Err(Error::InvalidArgument("--duration must be positive".to_string()));
    }
    let events = events
        .iter()
        .filter(|e| !e.trim().is_empty())
        .map(|e| parse_event(e, duration))
        .collect::<Result<Vec<_>>>()?;

    let store = ctx.progress_store()?;
    let mut session = PlaybackSession::start(store.clone(), key.clone(), &ctx.session_settings())
        .await
        .on_complete(|key| log::info!("Video completed: {}", key));
    let health = session.health();

    let mut steps = Vec::with_capacity(events.len());
    for (i, event) in events.iter().enumerate() {
        let transition = session.apply(*event);
        steps.push(StepDisplay::new(i + 1, event, &transition));
    }
    session.close().await;

    let report = SimulationReport {
        steps,
        health: health.borrow().clone(),
        record: store.get(&key).await?,
    };

    match ctx.format {
        OutputFormat::Json => output::print_json(&report),
        _ => {
            output::print(&report.steps, OutputFormat::Table)?;
            println!();
            if let SaveHealth::Failing {
                consecutive_failures,
                last_error,
            } = &report.health
            {
                println!(
                    "{} {} saves failed in a row: {}",
                    "⚠".yellow(),
                    consecutive_failures,
                    last_error
                );
            }
            match &report.record {
                Some(record) => print_record(record),
                None => println!("Nothing was saved for {}", key),
            }
            Ok(())
        }
    }
}
