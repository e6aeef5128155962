use std::path::Path;

use anyhow::{Context, Result};
use librarian_core::Config;
use tokio::fs;

/// Load `Config` from a JSON file, then apply any `LIBRARIAN_`-prefixed
/// environment overrides on top (`SPEC_FULL.md` §6). Only the fields an
/// operator would plausibly want to override per-deployment without
/// editing the file are covered; everything else, including the whole
/// `stores`/`background` sections, comes from the file alone.
pub async fn load_config(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .await
        .context("failed to read configuration file")?;

    let mut config: Config =
        serde_json::from_str(&contents).context("failed to parse configuration file")?;

    apply_env_overrides(&mut config);

    Ok(config)
}

pub async fn save_config(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let contents = serde_json::to_string_pretty(config).context("failed to serialize configuration")?;

    fs::write(path, contents)
        .await
        .context("failed to write configuration file")?;

    Ok(())
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(v) = std::env::var("LIBRARIAN_SITE_NAME") {
        config.site_name = v;
    }
    if let Ok(v) = std::env::var("LIBRARIAN_DATABASE_URL") {
        config.database_url = v;
    }
    if let Ok(v) = std::env::var("LIBRARIAN_HTTP_PORT") {
        if let Ok(port) = v.parse() {
            config.http_port = port;
        }
    }
    if let Ok(v) = std::env::var("LIBRARIAN_AUTHENTICATOR_ENCRYPTION_KEY") {
        config.authenticator_encryption_key = v;
    }
}
