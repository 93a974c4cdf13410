//! CLI command definitions and handlers

use clap::{Parser, Subcommand};
pub use clap_complete::Shell;

use completions::{course_id_candidates, user_id_candidates, video_id_candidates};

pub mod args;
pub mod cache;
pub mod completions;
pub mod context;
pub mod init;
pub mod progress;
pub mod status;

pub use args::{GlobalOptions, OutputFormat};
pub use context::CommandContext;

use crate::cache::Bucket;

/// flixcore - offline cache controller and watch-progress engine for ComunidadeFlix
#[derive(Parser, Debug)]
#[command(name = "flixcore")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (pretty, table, json)
    #[arg(
        long,
        global = true,
        env = "FLIXCORE_FORMAT",
        default_value = "pretty",
        hide_env = true,
        hide_possible_values = true
    )]
    pub format: OutputFormat,

    /// Override config file location
    #[arg(long, global = true, env = "FLIXCORE_CONFIG", hide_env = true)]
    pub config: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true, env = "FLIXCORE_DEBUG", hide_env = true)]
    pub debug: bool,

    /// Use the remote progress API instead of the local database
    #[arg(long, global = true, env = "FLIXCORE_REMOTE", hide_env = true)]
    pub remote: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize flixcore configuration
    Init,

    /// Show configuration and storage status
    Status,

    /// Display version information
    Version,

    /// Drive the offline cache controller
    #[command(subcommand)]
    Cache(CacheCommands),

    /// Watch progress and summaries
    #[command(subcommand)]
    Progress(ProgressCommands),

    /// Generate shell completions (static)
    #[command(after_help = "\
Static completions (subcommands/flags only):
  bash:   flixcore completion bash > /etc/bash_completion.d/flixcore
  zsh:    flixcore completion zsh > \"${fpath[1]}/_flixcore\"
  fish:   flixcore completion fish > ~/.config/fish/completions/flixcore.fish

Dynamic completions (includes user, course and video IDs from the local database):
  bash:   echo 'source <(COMPLETE=bash flixcore)' >> ~/.bashrc
  zsh:    echo 'source <(COMPLETE=zsh flixcore)' >> ~/.zshrc
  fish:   echo 'COMPLETE=fish flixcore | source' >> ~/.config/fish/config.fish")]
    Completion {
        /// Shell to generate completions for (static only)
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Offline cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show bucket statistics
    Status,

    /// Clear one bucket, or every cache when no bucket is given
    Clear {
        #[arg(long, short = 'b', value_enum)]
        bucket: Option<Bucket>,
    },

    /// Print cache directory path
    Path,

    /// Show how a request would be routed
    #[command(after_help = "EXAMPLES:\n  \
        flixcore cache classify /api/progress\n  \
        flixcore cache classify https://fonts.gstatic.com/s/inter.woff2\n  \
        flixcore cache classify /api/notes --method POST")]
    Classify {
        /// URL or origin-relative path
        url: String,

        /// HTTP method
        #[arg(long, short = 'm', default_value = "GET")]
        method: String,

        /// Treat the request as a page navigation
        #[arg(long, short = 'n')]
        navigate: bool,
    },

    /// Fetch a URL through the controller (network first, cache fallback)
    Fetch {
        /// URL or origin-relative path
        url: String,

        /// Treat the request as a page navigation
        #[arg(long, short = 'n')]
        navigate: bool,

        /// Print the response body
        #[arg(long)]
        body: bool,
    },

    /// Precache the static manifest
    Install,

    /// Delete caches from older versions
    Activate,

    /// Remove one URL from a bucket
    Evict {
        /// URL or origin-relative path
        url: String,

        #[arg(long, short = 'b', value_enum)]
        bucket: Bucket,
    },

    /// Replay queued background-sync requests
    Sync,

    /// Queue a request for background sync
    Enqueue {
        /// URL or origin-relative path
        url: String,

        /// HTTP method
        #[arg(long, short = 'm', default_value = "POST")]
        method: String,

        /// Request body (sent as application/json)
        #[arg(long, short = 'd')]
        data: Option<String>,
    },
}

/// Progress subcommands
#[derive(Subcommand, Debug)]
pub enum ProgressCommands {
    /// Show one progress record
    Show {
        #[arg(long, short = 'u', add = user_id_candidates())]
        user: String,

        #[arg(long, short = 'c', add = course_id_candidates())]
        course: String,

        #[arg(long, short = 'v', add = video_id_candidates())]
        video: String,
    },

    /// List every record of a user
    List {
        #[arg(long, short = 'u', add = user_id_candidates())]
        user: String,
    },

    /// Totals, weekly progress and streaks for a user
    Summary {
        #[arg(long, short = 'u', add = user_id_candidates())]
        user: String,

        /// Reference time (RFC 3339), defaults to now
        #[arg(long)]
        at: Option<String>,

        /// Keep running and print the summary on every change
        #[arg(long, short = 'w')]
        watch: bool,
    },

    /// Play a scripted session through the reconciler
    #[command(after_help = "EVENTS (comma separated):\n  \
        play | pause | ended | tick | <seconds>  (playhead position)\n\n\
        EXAMPLE:\n  \
        flixcore progress simulate -u u1 -c c1 -v v1 --duration 600 \\\n    \
        --events play,60,120,pause,play,60,300,600,ended")]
    Simulate {
        #[arg(long, short = 'u', add = user_id_candidates())]
        user: String,

        #[arg(long, short = 'c', add = course_id_candidates())]
        course: String,

        #[arg(long, short = 'v', add = video_id_candidates())]
        video: String,

        /// Video duration in seconds
        #[arg(long, short = 'd')]
        duration: f64,

        /// Player events to replay
        #[arg(long, short = 'e', value_delimiter = ',')]
        events: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_simulate_events_are_comma_separated() {
        let cli = Cli::try_parse_from([
            "flixcore", "progress", "simulate", "-u", "u1", "-c", "c1", "-v", "v1", "-d", "600",
            "-e", "play,60,pause",
        ])
        .unwrap();

        match cli.command {
            Commands::Progress(ProgressCommands::Simulate {
                events, duration, ..
            }) => {
                assert_eq!(events, vec!["play", "60", "pause"]);
                assert_eq!(duration, 600.0);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cache_clear_bucket_is_optional() {
        let cli = Cli::try_parse_from(["flixcore", "cache", "clear", "--bucket", "runtime"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Cache(CacheCommands::Clear {
                bucket: Some(Bucket::Runtime)
            })
        ));
    }
}
