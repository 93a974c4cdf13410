//! Init command implementation

use colored::Colorize;
use dialoguer::{Confirm, Input, Password, theme::ColorfulTheme};

use crate::cli::args::GlobalOptions;
use crate::config::Config;
use crate::error::Result;

/// Run the init command
///
/// Existing values are offered as defaults, so re-running init edits the
/// current file instead of starting over.
pub fn run(opts: &GlobalOptions) -> Result<()> {
    let theme = ColorfulTheme::default();
    let mut config = Config::load_at(opts.config_ref())?;

    println!("{}", "Welcome to flixcore!".bold().green());
    println!("Let's set up the offline cache and watch-progress engine.\n");

    config.cache.origin = Input::with_theme(&theme)
        .with_prompt("Site origin")
        .default(config.cache.origin.clone())
        .validate_with(|input: &String| -> std::result::Result<(), String> {
            reqwest::Url::parse(input)
                .map(|_| ())
                .map_err(|e| format!("Not a valid URL: {}", e))
        })
        .interact_text()?;

    config.cache.version = Input::with_theme(&theme)
        .with_prompt("Cache version")
        .default(config.cache.version.clone())
        .interact_text()?;

    config.progress.completion_threshold = Input::with_theme(&theme)
        .with_prompt("Completion threshold (0-1]")
        .default(config.progress.completion_threshold)
        .validate_with(|input: &f64| -> std::result::Result<(), String> {
            if *input > 0.0 && *input <= 1.0 {
                Ok(())
            } else {
                Err("Must be greater than 0 and at most 1".to_string())
            }
        })
        .interact_text()?;

    let use_remote = Confirm::with_theme(&theme)
        .with_prompt("Configure the remote progress API?")
        .default(config.api.base_url.is_some())
        .interact()?;

    if use_remote {
        let base_url: String = Input::with_theme(&theme)
            .with_prompt("API base URL")
            .default(
                config
                    .api
                    .base_url
                    .clone()
                    .unwrap_or_else(|| config.cache.origin.clone()),
            )
            .interact_text()?;
        config.api.base_url = Some(base_url);

        let token = Password::with_theme(&theme)
            .with_prompt("API token (leave empty for none)")
            .allow_empty_password(true)
            .interact()?;
        config.api.token = (!token.is_empty()).then_some(token);
    }

    config.validate()?;
    config.save_at(opts.config_ref())?;

    let config_path = Config::resolve_path(opts.config_ref())?;
    println!(
        "\n{} Configuration saved to: {}",
        "✓".green(),
        config_path.display()
    );

    println!("\n{}", "You're all set! Try running:".bold());
    println!("  {} - Show configuration status", "flixcore status".cyan());
    println!("  {} - Precache the app shell", "flixcore cache install".cyan());
    println!(
        "  {} - Summarize a user's progress",
        "flixcore progress summary -u <USER>".cyan()
    );

    Ok(())
}
