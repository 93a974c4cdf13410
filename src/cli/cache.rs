//! Cache management commands

use colored::Colorize;
use reqwest::Method;
use serde::Serialize;

use crate::cache::{
    Bucket, BucketSet, CacheStats, CacheStore, EventHandler, EventOutcome, PendingAction,
    Request, RequestMode, RoutePolicy, SyncQueue, WorkerEvent, WorkerMessage,
    sync::BACKGROUND_SYNC_TAG,
};
use crate::cli::{CommandContext, OutputFormat};
use crate::error::{Error, Result};
use crate::models::{BucketDisplay, PendingDisplay, RouteDisplay};
use crate::output::{self, formatters::format_size};

/// Build a request for a path or URL resolved against the configured origin
fn build_request(policy: &RoutePolicy, url: &str, method: &str, navigate: bool) -> Result<Request> {
    let method = Method::from_bytes(method.to_uppercase().as_bytes())
        .map_err(|_| Error::InvalidArgument(format!("Invalid HTTP method: {}", method)))?;
    let url = policy.resolve(url)?;
    let mode = if navigate {
        RequestMode::Navigate
    } else {
        RequestMode::Other
    };
    Ok(Request::new(method, url.as_str())?.with_mode(mode))
}

#[derive(Serialize)]
struct StatusReport<'a> {
    path: String,
    version: &'a str,
    pending_sync: usize,
    #[serde(flatten)]
    stats: &'a CacheStats,
}

/// Show bucket statistics
pub fn status(ctx: &CommandContext) -> Result<()> {
    let controller = ctx.controller()?;
    let stats = controller.stats()?;
    let pending = ctx.sync_queue()?.pending()?;
    let path = ctx.cache_dir()?.display().to_string();
    let rows: Vec<BucketDisplay> = stats
        .caches
        .iter()
        .map(|c| BucketDisplay::new(c, controller.buckets()))
        .collect();

    match ctx.format {
        OutputFormat::Json => output::print_json(&StatusReport {
            path,
            version: controller.buckets().version(),
            pending_sync: pending.len(),
            stats: &stats,
        }),
        OutputFormat::Table => output::print(&rows, ctx.format),
        OutputFormat::Pretty => {
            println!("{}", "Cache Status".bold());
            println!("────────────────────────────────────────");
            println!("Location:       {}", path.cyan());
            println!("Version:        {}", controller.buckets().version());
            println!("Entries:        {}", stats.total_entries);
            match stats.quota_bytes {
                Some(quota) => println!(
                    "Total size:     {} of {}",
                    format_size(stats.total_size_bytes),
                    format_size(quota as usize)
                ),
                None => println!("Total size:     {}", format_size(stats.total_size_bytes)),
            }
            println!("Pending sync:   {}", pending.len());

            if !rows.is_empty() {
                println!();
                output::print(&rows, ctx.format)?;
            }
            if rows.iter().any(|r| r.status == "stale") {
                println!(
                    "\n{} Stale caches are removed by {}",
                    "○".dimmed(),
                    "flixcore cache activate".cyan()
                );
            }
            Ok(())
        }
    }
}

/// Clear one bucket, or everything when no bucket is given
pub fn clear(ctx: &CommandContext, bucket: Option<Bucket>) -> Result<()> {
    let removed = match bucket {
        Some(bucket) => ctx.controller()?.clear_bucket(bucket)?,
        None => ctx.cache_store()?.clear_all()?.entries_removed,
    };

    match ctx.format {
        OutputFormat::Json => output::print_json(&serde_json::json!({
            "bucket": bucket,
            "entries_removed": removed,
        })),
        _ => {
            let target = bucket
                .map(|b| format!("{} bucket", b))
                .unwrap_or_else(|| "cache".to_string());
            if removed > 0 {
                println!("Cleared {} entries from the {}", removed, target);
            } else {
                println!("The {} was already empty", target);
            }
            Ok(())
        }
    }
}

/// Print the cache directory
pub fn path(ctx: &CommandContext) -> Result<()> {
    println!("{}", ctx.cache_dir()?.display());
    Ok(())
}

/// Show the route a request takes without touching the network
pub fn classify(ctx: &CommandContext, url: &str, method: &str, navigate: bool) -> Result<()> {
    let policy = RoutePolicy::from_settings(&ctx.config.cache)?;
    let buckets = BucketSet::from_settings(&ctx.config.cache);
    let request = build_request(&policy, url, method, navigate)?;
    let route = crate::cache::classify(&request, &policy);

    match ctx.format {
        OutputFormat::Json => output::print_json(&serde_json::json!({
            "method": request.method.as_str(),
            "url": request.url.as_str(),
            "navigate": request.is_navigation(),
            "route": route,
            "cache": match route {
                crate::cache::Route::Cached(bucket) => Some(buckets.name(bucket)),
                _ => None,
            },
        })),
        _ => output::print(&vec![RouteDisplay::new(&request, route, &buckets)], ctx.format),
    }
}

#[derive(Serialize)]
struct FetchReport {
    url: String,
    status: u16,
    source: crate::cache::ResponseSource,
    content_type: Option<String>,
    bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<String>,
}

/// Fetch through the controller, falling back to the cache when offline
pub async fn fetch(ctx: &CommandContext, url: &str, navigate: bool, body: bool) -> Result<()> {
    let worker = ctx.worker()?;
    let request = build_request(worker.controller().policy(), url, "GET", navigate)?;
    let target = request.url.to_string();

    let response = match worker.dispatch(WorkerEvent::Fetch(request)).await? {
        EventOutcome::Fetched(result) => result?,
        other => {
            log::debug!("Unexpected fetch outcome: {:?}", other);
            return Err(Error::InvalidArgument(format!("{} was not fetched", target)));
        }
    };

    let report = FetchReport {
        url: target,
        status: response.status,
        source: response.source,
        content_type: response.header("content-type").map(str::to_string),
        bytes: response.body.len(),
        body: body.then(|| String::from_utf8_lossy(&response.body).into_owned()),
    };

    match ctx.format {
        OutputFormat::Json => output::print_json(&report),
        _ => {
            let status = if response.is_ok() {
                report.status.to_string().green()
            } else {
                report.status.to_string().red()
            };
            println!(
                "{} {} ({:?}, {})",
                status,
                report.url,
                report.source,
                format_size(report.bytes)
            );
            if let Some(text) = &report.body {
                println!("\n{}", text);
            }
            Ok(())
        }
    }
}

/// Precache the static manifest with a progress bar
pub async fn install(ctx: &CommandContext) -> Result<()> {
    let controller = ctx.controller()?;
    let bar = if ctx.format == OutputFormat::Json {
        indicatif::ProgressBar::hidden()
    } else {
        output::progress_bar(ctx.config.cache.precache.len() as u64, "Precaching")
    };

    let result = controller
        .install_with(|url| {
            bar.set_message(url.to_string());
            bar.inc(1);
        })
        .await;
    bar.finish_and_clear();
    let report = result?;

    match ctx.format {
        OutputFormat::Json => output::print_json(&report),
        _ => {
            println!(
                "{} Precached {} assets into {}",
                "✓".green(),
                report.cached.len(),
                report.cache.bold()
            );
            Ok(())
        }
    }
}

/// Delete caches from older versions
pub async fn activate(ctx: &CommandContext) -> Result<()> {
    let report = match ctx.worker()?.dispatch(WorkerEvent::Activate).await? {
        EventOutcome::Activated(report) => report,
        other => {
            log::debug!("Unexpected activate outcome: {:?}", other);
            return Ok(());
        }
    };

    match ctx.format {
        OutputFormat::Json => output::print_json(&report),
        _ => {
            for name in &report.deleted {
                println!("{} Deleted {}", "✗".red(), name);
            }
            for name in &report.kept {
                println!("{} Kept {}", "✓".green(), name);
            }
            if report.deleted.is_empty() {
                println!("No old caches to delete");
            }
            Ok(())
        }
    }
}

/// Remove one URL from a bucket
pub async fn evict(ctx: &CommandContext, url: &str, bucket: Bucket) -> Result<()> {
    let message = WorkerMessage::CacheUpdate {
        url: url.to_string(),
        bucket,
    };
    let removed = match ctx.worker()?.dispatch(WorkerEvent::Message(message)).await? {
        EventOutcome::Evicted { removed } => removed,
        _ => false,
    };

    match ctx.format {
        OutputFormat::Json => output::print_json(&serde_json::json!({
            "url": url,
            "bucket": bucket,
            "removed": removed,
        })),
        _ => {
            if removed {
                println!("Evicted {} from the {} bucket", url, bucket);
            } else {
                println!("{} was not cached in the {} bucket", url, bucket);
            }
            Ok(())
        }
    }
}

/// Replay queued background-sync requests
pub async fn sync(ctx: &CommandContext) -> Result<()> {
    let worker = ctx.worker()?;
    let event = WorkerEvent::Sync {
        tag: BACKGROUND_SYNC_TAG.to_string(),
    };
    let report = match worker.dispatch(event).await? {
        EventOutcome::Synced(report) => report,
        other => {
            log::debug!("Unexpected sync outcome: {:?}", other);
            return Ok(());
        }
    };

    match ctx.format {
        OutputFormat::Json => output::print_json(&report),
        _ => {
            println!(
                "Replayed {}, failed {}, {} still queued",
                report.replayed.to_string().green(),
                report.failed.to_string().red(),
                report.remaining
            );
            if report.dropped > 0 {
                println!(
                    "{} Dropped {} action(s) that could not be replayed",
                    "⚠".yellow(),
                    report.dropped
                );
            }
            if report.remaining > 0 {
                let pending: Vec<PendingDisplay> = worker
                    .queue()
                    .pending()?
                    .iter()
                    .map(PendingDisplay::from)
                    .collect();
                println!();
                output::print(&pending, OutputFormat::Table)?;
            }
            Ok(())
        }
    }
}

/// Queue a request for the next background sync
pub fn enqueue(ctx: &CommandContext, url: &str, method: &str, data: Option<&str>) -> Result<()> {
    let policy = RoutePolicy::from_settings(&ctx.config.cache)?;
    let request = build_request(&policy, url, method, false)?;

    let mut action = PendingAction::new(
        request.method,
        request.url.as_str(),
        data.map(|d| d.as_bytes().to_vec()),
        ctx.clock.now(),
    );
    if data.is_some() {
        action
            .headers
            .push(("content-type".to_string(), "application/json".to_string()));
    }
    action.id = ctx.sync_queue()?.enqueue(&action)?;

    match ctx.format {
        OutputFormat::Json => output::print_json(&action),
        _ => output::print(&vec![PendingDisplay::from(&action)], ctx.format),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheSettings;

    fn policy() -> RoutePolicy {
        RoutePolicy::from_settings(&CacheSettings::default()).unwrap()
    }

    #[test]
    fn test_build_request_resolves_relative_path() {
        let request = build_request(&policy(), "/api/progress", "get", false).unwrap();
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.url.as_str(), "http://localhost:3000/api/progress");
        assert!(!request.is_navigation());
    }

    #[test]
    fn test_build_request_navigation_and_absolute_url() {
        let request =
            build_request(&policy(), "https://fonts.gstatic.com/s/inter.woff2", "GET", true)
                .unwrap();
        assert_eq!(request.url.host_str(), Some("fonts.gstatic.com"));
        assert!(request.is_navigation());
    }

    #[test]
    fn test_build_request_rejects_bad_method() {
        let err = build_request(&policy(), "/", "NOT A METHOD", false).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
