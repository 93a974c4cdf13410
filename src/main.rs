//! flixcore CLI - drive the offline cache controller and watch-progress engine

use clap::{CommandFactory, Parser};
use clap_complete::CompleteEnv;

use flixcore::cli::{
    self, CacheCommands, Cli, CommandContext, Commands, GlobalOptions, ProgressCommands,
};
use flixcore::error::Result;
use flixcore::progress::ProgressKey;

#[tokio::main]
async fn main() {
    // Answers `COMPLETE=<shell> flixcore` and exits; no-op otherwise
    CompleteEnv::with_factory(Cli::command).complete();

    let cli = Cli::parse();
    init_logging(cli.debug);

    if let Err(err) = run(cli).await {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

/// `--debug` forces debug level; otherwise `RUST_LOG`, defaulting to warn
fn init_logging(debug: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if debug {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.format_timestamp(None).init();
    log::debug!("Debug logging enabled");
}

async fn run(cli: Cli) -> Result<()> {
    let opts = GlobalOptions::from_cli(&cli);

    match cli.command {
        Commands::Init => cli::init::run(&opts),
        Commands::Status => cli::status::run(&opts),
        Commands::Version => {
            println!("flixcore version {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Completion { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "flixcore", &mut std::io::stdout());
            Ok(())
        }
        Commands::Cache(cmd) => {
            let ctx = CommandContext::new(&opts)?;
            match cmd {
                CacheCommands::Status => cli::cache::status(&ctx),
                CacheCommands::Clear { bucket } => cli::cache::clear(&ctx, bucket),
                CacheCommands::Path => cli::cache::path(&ctx),
                CacheCommands::Classify {
                    url,
                    method,
                    navigate,
                } => cli::cache::classify(&ctx, &url, &method, navigate),
                CacheCommands::Fetch {
                    url,
                    navigate,
                    body,
                } => cli::cache::fetch(&ctx, &url, navigate, body).await,
                CacheCommands::Install => cli::cache::install(&ctx).await,
                CacheCommands::Activate => cli::cache::activate(&ctx).await,
                CacheCommands::Evict { url, bucket } => cli::cache::evict(&ctx, &url, bucket).await,
                CacheCommands::Sync => cli::cache::sync(&ctx).await,
                CacheCommands::Enqueue { url, method, data } => {
                    cli::cache::enqueue(&ctx, &url, &method, data.as_deref())
                }
            }
        }
        Commands::Progress(cmd) => {
            let ctx = CommandContext::new(&opts)?;
            match cmd {
                ProgressCommands::Show {
                    user,
                    course,
                    video,
                } => cli::progress::show(&ctx, &user, &course, &video).await,
                ProgressCommands::List { user } => cli::progress::list(&ctx, &user).await,
                ProgressCommands::Summary { user, at, watch } => {
                    cli::progress::summary(&ctx, &user, at.as_deref(), watch).await
                }
                ProgressCommands::Simulate {
                    user,
                    course,
                    video,
                    duration,
                    events,
                } => {
                    let key = ProgressKey::new(user, course, video);
                    cli::progress::simulate(&ctx, key, duration, &events).await
                }
            }
        }
    }
}
