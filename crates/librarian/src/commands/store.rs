use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use librarian_db::Database;

use crate::config;

#[derive(clap::Subcommand)]
pub enum StoreCommands {
    /// Register a new local store
    Add {
        name: String,

        /// Store backend kind, e.g. "local"
        #[arg(long, default_value = "local")]
        store_type: String,

        /// Filesystem root this store owns
        root: PathBuf,

        /// Accept ingest from peer librarians (clone/stage)
        #[arg(long)]
        ingestable: bool,

        /// Register the store disabled
        #[arg(long)]
        disabled: bool,

        #[arg(long, value_delimiter = ',')]
        transfer_managers: Vec<String>,

        #[arg(long, value_delimiter = ',')]
        async_transfer_managers: Vec<String>,
    },

    /// List registered stores
    List,

    /// Enable a store for new ingest
    Enable { name: String },

    /// Disable a store for new ingest, without affecting existing instances
    Disable { name: String },
}

pub async fn handle(config_path: &Path, cmd: StoreCommands) -> Result<()> {
    let config = config::load_config(config_path)
        .await
        .context("failed to load configuration")?;

    let db = Database::new(&config.database_url)
        .await
        .context("failed to connect to database")?;

    match cmd {
        StoreCommands::Add {
            name,
            store_type,
            root,
            ingestable,
            disabled,
            transfer_managers,
            async_transfer_managers,
        } => {
            if db.get_store_by_name(&name).await?.is_some() {
                anyhow::bail!("store '{name}' already exists");
            }

            tokio::fs::create_dir_all(&root)
                .await
                .with_context(|| format!("failed to create store root at {}", root.display()))?;

            let store = db
                .create_store(
                    &name,
                    &store_type,
                    serde_json::json!({}),
                    &transfer_managers,
                    &async_transfer_managers,
                    ingestable,
                    !disabled,
                )
                .await?;

            println!("✓ store created");
            println!("  id: {}", store.id);
            println!("  name: {}", store.name);
            println!("  root: {}", root.display());
            println!("  ingestable: {ingestable}");
            println!("  enabled: {}", !disabled);
            println!();
            println!("add this store to your config.json's \"stores\" list so the");
            println!("server starts a matching StoreManager for it.");
        }

        StoreCommands::List => {
            let stores = db.list_stores().await?;

            if stores.is_empty() {
                println!("no stores registered.");
            } else {
                println!("stores:\n");
                for store in stores {
                    println!("  {} ({})", store.name, store.store_type);
                    println!("    id: {}", store.id);
                    println!("    ingestable: {}", store.ingestable);
                    println!("    enabled: {}", store.enabled);
                    println!();
                }
            }
        }

        StoreCommands::Enable { name } => {
            let store = db
                .get_store_by_name(&name)
                .await?
                .with_context(|| format!("store not found: {name}"))?;
            db.set_store_enabled(store.id, true).await?;
            println!("✓ store '{name}' enabled");
        }

        StoreCommands::Disable { name } => {
            let store = db
                .get_store_by_name(&name)
                .await?
                .with_context(|| format!("store not found: {name}"))?;
            db.set_store_enabled(store.id, false).await?;
            println!("✓ store '{name}' disabled");
        }
    }

    Ok(())
}
