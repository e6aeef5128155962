use std::path::Path;

use anyhow::{Context, Result};
use librarian_core::encryption::encrypt_authenticator;
use librarian_db::Database;

use crate::config;

#[derive(clap::Subcommand)]
pub enum LibrarianCommands {
    /// Register a peer librarian this instance can send to or receive from
    Add {
        name: String,

        /// Base URL, e.g. "https://librarian.example.edu"
        url: String,

        port: u16,

        /// Credentials this instance presents to the peer over HTTP Basic
        username: String,
        password: String,
    },

    /// List known peers
    List,

    /// Remove a peer
    Remove { name: String },

    /// Enable or disable outbound transfers to a peer without removing it
    SetTransfers {
        name: String,

        #[arg(long)]
        enabled: bool,
    },
}

pub async fn handle(config_path: &Path, cmd: LibrarianCommands) -> Result<()> {
    let config = config::load_config(config_path)
        .await
        .context("failed to load configuration")?;

    let db = Database::new(&config.database_url)
        .await
        .context("failed to connect to database")?;

    match cmd {
        LibrarianCommands::Add {
            name,
            url,
            port,
            username,
            password,
        } => {
            if db.get_librarian_by_name(&name).await?.is_some() {
                anyhow::bail!("librarian '{name}' already registered");
            }

            let authenticator = encrypt_authenticator(
                &format!("{username}:{password}"),
                &config.authenticator_encryption_key,
            )
            .context("failed to encrypt peer authenticator")?;

            let librarian = db.create_librarian(&name, &url, port, &authenticator).await?;

            println!("✓ peer librarian registered");
            println!("  id: {}", librarian.id);
            println!("  name: {}", librarian.name);
            println!("  url: {}:{}", librarian.url, librarian.port);
            println!();
            println!("the peer must register this instance's own site name");
            println!("and the same username/password, or callback requests will");
            println!("be rejected with 401.");
        }

        LibrarianCommands::List => {
            let librarians = db.list_librarians().await?;

            if librarians.is_empty() {
                println!("no peer librarians registered.");
            } else {
                println!("peer librarians:\n");
                for librarian in librarians {
                    println!("  {} ({}:{})", librarian.name, librarian.url, librarian.port);
                    println!("    transfers enabled: {}", librarian.transfers_enabled);
                    if let Some(seen) = librarian.last_seen {
                        println!("    last seen: {}", seen.format("%Y-%m-%d %H:%M:%S"));
                    }
                    if let Some(heard) = librarian.last_heard {
                        println!("    last heard: {}", heard.format("%Y-%m-%d %H:%M:%S"));
                    }
                    println!();
                }
            }
        }

        LibrarianCommands::Remove { name } => {
            db.remove_librarian(&name).await?;
            println!("✓ peer librarian '{name}' removed");
        }

        LibrarianCommands::SetTransfers { name, enabled } => {
            db.set_librarian_transfers_enabled(&name, enabled).await?;
            println!("✓ transfers with '{name}' {}", if enabled { "enabled" } else { "disabled" });
        }
    }

    Ok(())
}
