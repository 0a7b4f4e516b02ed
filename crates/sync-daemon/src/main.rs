//! syncd: mirrors captured notebook content into external destinations.

mod app;
mod http_adapter;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sync_config_and_utils::{init_logging_for_service, Config, Paths};

/// syncd command-line interface.
#[derive(Parser)]
#[command(name = "syncd")]
#[command(about = "Content sync dispatcher: queue worker, backfill and destination setup")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for runtime files (config, database, logs). Defaults to ~/.syncd
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the background sync worker until interrupted
    Run,
    /// Deliver an owner's notebooks to one destination
    Backfill {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        destination: String,
        /// Queue every page at backfill priority instead of delivering now
        #[arg(long)]
        queue: bool,
    },
    /// Queue one stored page for all of its owner's destinations
    QueuePage {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        page: String,
    },
    /// Cancel a pending queue row
    Cancel {
        #[arg(long)]
        row: i64,
    },
    /// Show queue and record counts
    Status {
        #[arg(long)]
        owner: Option<String>,
    },
    /// Create or update an owner's destination configuration
    ConfigureDestination {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        destination: String,
        /// Store the destination as disabled
        #[arg(long)]
        disable: bool,
        /// Only todos go to this destination
        #[arg(long)]
        todo_only: bool,
        /// The destination accepts todos
        #[arg(long)]
        supports_todos: bool,
        /// Credential to seal with the configured credential key
        #[arg(long, env = "SYNCD_DESTINATION_CREDENTIALS", hide_env_values = true)]
        credentials: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    paths.ensure_dirs()?;
    let mut config = Config::load(&paths)?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    init_logging_for_service("syncd", &config.log_level, Some(paths.log_file()));

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => app::run_daemon(config, paths).await?,
        Commands::Backfill {
            owner,
            destination,
            queue,
        } => app::backfill(config, paths, &owner, &destination, queue).await?,
        Commands::QueuePage { owner, page } => app::queue_page(config, paths, &owner, &page).await?,
        Commands::Cancel { row } => app::cancel_row(config, paths, row).await?,
        Commands::Status { owner } => app::show_status(config, paths, owner.as_deref()).await?,
        Commands::ConfigureDestination {
            owner,
            destination,
            disable,
            todo_only,
            supports_todos,
            credentials,
        } => {
            app::configure_destination(
                config,
                paths,
                app::DestinationSettings {
                    owner,
                    destination,
                    enabled: !disable,
                    todo_only,
                    supports_todos,
                    credentials,
                },
            )
            .await?
        }
    }

    Ok(())
}
