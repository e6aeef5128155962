//! `file upload`/`file search`: the client-role operations a caller runs
//! against a running server over Bearer auth, as distinct from the
//! peer-to-peer protocol `librarian-client::LibrarianClient` drives.
//!
//! `file upload`'s "local" transfer provider assumes the CLI runs
//! co-located with the store root (the same assumption
//! `original_source/hera_librarian/async_transfers/local.py`'s
//! `shutil.copy2` makes): it resolves the staged path against this
//! instance's own `config.json`, not against a path the server hands back.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use librarian_core::checksum::compute_file_checksum;
use librarian_core::types::ChecksumAlgorithm;
use librarian_client::{SearchFileRequest, SearchFileResponse};
use librarian_http::models::{UploadCommitRequest, UploadStageRequest, UploadStageResponse};

use crate::config;

#[derive(clap::Subcommand)]
pub enum FileCommands {
    /// Stage and commit a local file to a running server
    Upload {
        local_path: PathBuf,

        /// Destination name within the librarian's namespace
        destination_location: String,

        /// Base URL of the server, e.g. "http://localhost:8080"
        #[arg(long)]
        server: String,

        /// Bearer API key; falls back to LIBRARIAN_API_KEY
        #[arg(long)]
        api_key: Option<String>,

        #[arg(long, default_value = "cli-user")]
        uploader: String,
    },

    /// Search a running server's file catalog
    Search {
        #[arg(long)]
        server: String,

        #[arg(long)]
        api_key: Option<String>,

        name: Option<String>,

        #[arg(long)]
        uploader: Option<String>,

        #[arg(long)]
        source: Option<String>,

        #[arg(long)]
        max_results: Option<u32>,
    },
}

fn resolve_api_key(api_key: Option<String>) -> Result<String> {
    api_key
        .or_else(|| std::env::var("LIBRARIAN_API_KEY").ok())
        .context("no API key given (--api-key or LIBRARIAN_API_KEY)")
}

pub async fn handle(config_path: &Path, cmd: FileCommands) -> Result<()> {
    match cmd {
        FileCommands::Upload {
            local_path,
            destination_location,
            server,
            api_key,
            uploader,
        } => upload(config_path, &local_path, &destination_location, &server, resolve_api_key(api_key)?, &uploader).await,

        FileCommands::Search {
            server,
            api_key,
            name,
            uploader,
            source,
            max_results,
        } => search(&server, resolve_api_key(api_key)?, name, uploader, source, max_results).await,
    }
}

async fn upload(
    config_path: &Path,
    local_path: &Path,
    destination_location: &str,
    server: &str,
    api_key: String,
    uploader: &str,
) -> Result<()> {
    let config = config::load_config(config_path)
        .await
        .context("failed to load configuration")?;

    let metadata = tokio::fs::metadata(local_path)
        .await
        .with_context(|| format!("cannot stat {}", local_path.display()))?;
    let upload_size = metadata.len() as i64;

    let local_path_owned = local_path.to_path_buf();
    let checksum = tokio::task::spawn_blocking(move || compute_file_checksum(&local_path_owned, ChecksumAlgorithm::Sha256))
        .await
        .context("checksum computation panicked")??;

    let http = reqwest::Client::new();
    let base = server.trim_end_matches('/');

    let stage_req = UploadStageRequest {
        destination_location: destination_location.to_string(),
        upload_size,
        upload_checksum: checksum,
        uploader: uploader.to_string(),
        upload_name: destination_location.to_string(),
    };

    let stage_resp: UploadStageResponse = http
        .post(format!("{base}/api/v2/upload/stage"))
        .bearer_auth(&api_key)
        .json(&stage_req)
        .send()
        .await
        .context("upload/stage request failed")?
        .error_for_status()
        .context("upload/stage rejected")?
        .json()
        .await
        .context("upload/stage returned an unreadable response")?;

    let store_config = config
        .stores
        .iter()
        .find(|s| s.name == stage_resp.store_name)
        .with_context(|| {
            format!(
                "store '{}' is not in this CLI's own config.json; 'local' uploads require running \
                 alongside the server's store roots",
                stage_resp.store_name
            )
        })?;

    let staging_absolute = store_config.root.join("staging").join(&stage_resp.staging_location);
    if let Some(parent) = staging_absolute.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::copy(local_path, &staging_absolute)
        .await
        .with_context(|| format!("failed to copy into staging path {}", staging_absolute.display()))?;

    println!("staged {} bytes at {}", upload_size, staging_absolute.display());

    http.post(format!("{base}/api/v2/upload/commit"))
        .bearer_auth(&api_key)
        .json(&UploadCommitRequest {
            transfer_id: stage_resp.transfer_id,
            transfer_provider: "local".to_string(),
        })
        .send()
        .await
        .context("upload/commit request failed")?
        .error_for_status()
        .context("upload/commit rejected")?;

    println!("✓ uploaded '{destination_location}' to store '{}'", stage_resp.store_name);

    Ok(())
}

async fn search(
    server: &str,
    api_key: String,
    name: Option<String>,
    uploader: Option<String>,
    source: Option<String>,
    max_results: Option<u32>,
) -> Result<()> {
    let http = reqwest::Client::new();
    let base = server.trim_end_matches('/');

    let req = SearchFileRequest {
        name,
        create_time_window: None,
        uploader,
        source,
        max_results,
    };

    let response = http
        .post(format!("{base}/api/v2/search/file"))
        .bearer_auth(&api_key)
        .json(&req)
        .send()
        .await
        .context("search/file request failed")?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        println!("no files matched.");
        return Ok(());
    }

    let items: SearchFileResponse = response
        .error_for_status()
        .context("search/file rejected")?
        .json()
        .await
        .context("search/file returned an unreadable response")?;

    for item in items {
        println!("{} ({} bytes)", item.name, item.size);
        println!("  uploader: {}", item.uploader);
        println!("  source: {}", item.source);
        println!("  created: {}", item.create_time.format("%Y-%m-%d %H:%M:%S"));
        for instance in &item.instances {
            println!("  instance: store={} path={} available={}", instance.store, instance.path, instance.available);
        }
        for remote in &item.remote_instances {
            println!("  remote copy: librarian={} store_id={}", remote.librarian, remote.store_id);
        }
        println!();
    }

    Ok(())
}
