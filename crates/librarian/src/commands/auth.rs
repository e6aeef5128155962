use std::path::Path;

use anyhow::{Context, Result};
use librarian_core::types::UserRole;
use librarian_db::Database;
use librarian_http::auth::{generate_api_key, hash_api_key};
use uuid::Uuid;

use crate::config;

#[derive(clap::Subcommand)]
pub enum UserCommands {
    /// Create a new user
    Create {
        username: String,

        /// admin, read-append, callback or read-only
        #[arg(short, long)]
        role: String,
    },

    /// List all users
    List,

    /// Show a user's details and API keys
    Info { username: String },
}

#[derive(clap::Subcommand)]
pub enum ApiKeyCommands {
    /// Generate a new API key for a user
    Create {
        username: String,

        #[arg(short, long)]
        name: String,
    },

    /// List API keys for a user
    List { username: String },

    /// Revoke an API key
    Revoke { key_id: String },
}

fn parse_role(role: &str) -> Result<UserRole> {
    match role.to_lowercase().replace('_', "-").as_str() {
        "admin" => Ok(UserRole::Admin),
        "read-append" | "readappend" => Ok(UserRole::ReadAppend),
        "callback" => Ok(UserRole::Callback),
        "read-only" | "readonly" => Ok(UserRole::ReadOnly),
        other => anyhow::bail!("invalid role: {other}. must be one of: admin, read-append, callback, read-only"),
    }
}

pub async fn handle_user(config_path: &Path, cmd: UserCommands) -> Result<()> {
    let config = config::load_config(config_path)
        .await
        .context("failed to load configuration")?;

    let db = Database::new(&config.database_url)
        .await
        .context("failed to connect to database")?;

    match cmd {
        UserCommands::Create { username, role } => {
            let user_role = parse_role(&role)?;
            let user = db.create_user(&username, user_role).await?;

            println!("✓ user created");
            println!("  id: {}", user.id);
            println!("  username: {}", user.username);
            println!("  role: {:?}", user.role);
            println!("\nNext steps:");
            println!("  generate an API key with:");
            println!("  librarian api-key create {} --name \"my api key\"", username);
        }

        UserCommands::List => {
            let users = db.list_users().await?;

            if users.is_empty() {
                println!("no users found.");
                println!("\ncreate the first admin user with:");
                println!("  librarian user create admin --role admin");
            } else {
                println!("users:\n");
                for user in users {
                    println!("  {} ({:?})", user.username, user.role);
                    println!("    id: {}", user.id);
                    println!("    created: {}", user.created_at.format("%Y-%m-%d %H:%M:%S"));
                    println!();
                }
            }
        }

        UserCommands::Info { username } => {
            let user = db
                .get_user_by_username(&username)
                .await?
                .with_context(|| format!("user not found: {username}"))?;

            println!("user: {}", user.username);
            println!("  id: {}", user.id);
            println!("  role: {:?}", user.role);
            println!("  created: {}", user.created_at.format("%Y-%m-%d %H:%M:%S"));

            let keys = db.list_user_api_keys(user.id).await?;
            println!("\napi keys: {}", keys.len());
            for key in keys {
                println!("  {} ({})", key.name, key.id);
                println!("    created: {}", key.created_at.format("%Y-%m-%d %H:%M:%S"));
                if let Some(last_used) = key.last_used_at {
                    println!("    last used: {}", last_used.format("%Y-%m-%d %H:%M:%S"));
                }
                println!();
            }
        }
    }

    Ok(())
}

pub async fn handle_api_key(config_path: &Path, cmd: ApiKeyCommands) -> Result<()> {
    let config = config::load_config(config_path)
        .await
        .context("failed to load configuration")?;

    let db = Database::new(&config.database_url)
        .await
        .context("failed to connect to database")?;

    match cmd {
        ApiKeyCommands::Create { username, name } => {
            let user = db
                .get_user_by_username(&username)
                .await?
                .with_context(|| format!("user not found: {username}"))?;

            let key = generate_api_key();
            let key_hash = hash_api_key(&key);
            let api_key = db.create_api_key(user.id, &name, &key_hash).await?;

            println!("✓ API key created");
            println!();
            println!("  user: {}", user.username);
            println!("  name: {}", name);
            println!("  key id: {}", api_key.id);
            println!();
            println!("  API key: {key}");
            println!();
            println!("⚠ store this key securely; it is shown only once and is");
            println!("  persisted as a hash, never the plaintext.");
            println!();
            println!("usage:");
            println!("  curl -H \"Authorization: Bearer {key}\" \\");
            println!("    http://localhost:{}/api/v2/search/file", config.http_port);
        }

        ApiKeyCommands::List { username } => {
            let user = db
                .get_user_by_username(&username)
                .await?
                .with_context(|| format!("user not found: {username}"))?;

            let keys = db.list_user_api_keys(user.id).await?;

            println!("API keys for '{username}':\n");
            if keys.is_empty() {
                println!("none found.");
                println!("\ncreate one with:");
                println!("  librarian api-key create {username} --name \"my key\"");
            } else {
                for key in keys {
                    println!("  {} ({})", key.name, key.id);
                    println!("    created: {}", key.created_at.format("%Y-%m-%d %H:%M:%S"));
                    if let Some(last_used) = key.last_used_at {
                        println!("    last used: {}", last_used.format("%Y-%m-%d %H:%M:%S"));
                    }
                    println!();
                }
            }
        }

        ApiKeyCommands::Revoke { key_id } => {
            let id = Uuid::parse_str(&key_id).context("invalid API key id")?;
            db.revoke_api_key(id).await?;
            println!("✓ API key revoked; it can no longer be used for authentication.");
        }
    }

    Ok(())
}
