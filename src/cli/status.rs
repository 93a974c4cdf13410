//! Status command implementation

use colored::Colorize;

use crate::cli::CommandContext;
use crate::cli::args::GlobalOptions;
use crate::config::Config;
use crate::error::Result;

/// Show where configuration, cache and progress live and what is in use
pub fn run(opts: &GlobalOptions) -> Result<()> {
    println!("{}\n", "flixcore Configuration Status".bold());

    let config_path = Config::resolve_path(opts.config_ref())?;
    if config_path.exists() {
        println!("Config file: {}", config_path.display().to_string().cyan());
    } else {
        println!(
            "{} No config file at {} (using defaults)",
            "○".dimmed(),
            config_path.display()
        );
        println!("  → Run 'flixcore init' to create one");
    }

    let ctx = match CommandContext::new(opts) {
        Ok(ctx) => ctx,
        Err(e) => {
            println!("{} Configuration invalid: {}", "✗".red(), e);
            return Ok(());
        }
    };
    let config = &ctx.config;
    println!();

    // Offline cache
    println!("{}", "Offline cache".bold());
    println!("  Origin:        {}", config.cache.origin.cyan());
    println!("  Version:       {}", config.cache.version);
    println!("  Directory:     {}", ctx.cache_dir()?.display());
    println!("  Precache:      {} assets", config.cache.precache.len());
    match config.cache.quota_bytes {
        Some(quota) => println!("  Quota:         {} bytes", quota),
        None => println!("  Quota:         {}", "none".dimmed()),
    }
    println!();

    // Watch progress
    println!("{}", "Watch progress".bold());
    println!(
        "  Completion:    {:.0}% of duration",
        config.progress.completion_threshold * 100.0
    );
    println!(
        "  Autosave:      every {}s",
        config.progress.save_interval().as_secs_f64()
    );
    println!("  Local store:   {}", ctx.progress_db_path()?.display());

    match &config.api.base_url {
        Some(url) => {
            println!("{} Remote API: {}", "✓".green(), url.cyan());
            if config.api.token.is_some() {
                println!("{} API token configured", "✓".green());
            } else {
                println!("{} No API token (requests are anonymous)", "○".dimmed());
            }
        }
        None => {
            println!("{} Remote API not configured", "○".dimmed());
        }
    }

    if ctx.remote {
        println!("\nStore in use: {}", "remote".bold());
    } else {
        println!("\nStore in use: {}", "local".bold());
    }
    println!();

    Ok(())
}
