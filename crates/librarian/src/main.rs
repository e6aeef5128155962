mod commands;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::auth::{ApiKeyCommands, UserCommands};
use commands::file::FileCommands;
use commands::peer::LibrarianCommands;
use commands::store::StoreCommands;

#[derive(Parser)]
#[command(name = "librarian")]
#[command(about = "Federated file-replication and storage-integrity librarian", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/librarian/config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server and background scheduler
    Server {
        /// Write a default configuration file instead of running
        #[arg(long)]
        init_config: bool,
    },

    /// Manage this librarian's own stores
    #[command(subcommand)]
    Store(StoreCommands),

    /// Manage peer librarians this instance replicates with
    #[command(subcommand)]
    Librarian(LibrarianCommands),

    /// Manage local user accounts
    #[command(subcommand)]
    User(UserCommands),

    /// Manage API keys
    #[command(subcommand)]
    ApiKey(ApiKeyCommands),

    /// Client-role operations against a running server (upload, search)
    #[command(subcommand)]
    File(FileCommands),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "librarian=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server { init_config } => {
            if init_config {
                commands::server::init_config(&cli.config).await?;
            } else {
                commands::server::run(&cli.config).await?;
            }
        }
        Commands::Store(cmd) => {
            commands::store::handle(&cli.config, cmd).await?;
        }
        Commands::Librarian(cmd) => {
            commands::peer::handle(&cli.config, cmd).await?;
        }
        Commands::User(cmd) => {
            commands::auth::handle_user(&cli.config, cmd).await?;
        }
        Commands::ApiKey(cmd) => {
            commands::auth::handle_api_key(&cli.config, cmd).await?;
        }
        Commands::File(cmd) => {
            commands::file::handle(&cli.config, cmd).await?;
        }
    }

    Ok(())
}
