use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use librarian_background::queues::{CheckSendQueue, ConsumeSendQueue};
use librarian_background::scheduler;
use librarian_background::tasks::check_integrity::CheckIntegrity;
use librarian_background::tasks::create_local_clone::CreateLocalClone;
use librarian_background::tasks::duplicate_remote_instance_hypervisor::DuplicateRemoteInstanceHypervisor;
use librarian_background::tasks::incoming_hypervisor::IncomingTransferHypervisor;
use librarian_background::tasks::outgoing_hypervisor::OutgoingTransferHypervisor;
use librarian_background::tasks::receive_clone::ReceiveClone;
use librarian_background::tasks::rolling_deletion::RollingDeletion;
use librarian_background::tasks::send_clone::SendClone;
use librarian_background::{Task, TaskContext};
use librarian_core::config::TaskSchedule;
use librarian_core::Config;
use librarian_db::Database;
use librarian_http::HttpServer;
use librarian_store::{LocalStore, StoreManager};
use tracing::info;

use crate::config;

pub async fn init_config(config_path: &Path) -> Result<()> {
    let default_config = Config::default();
    config::save_config(config_path, &default_config).await?;
    println!("Configuration file created at: {}", config_path.display());
    println!("\nPlease review and edit the configuration before starting the server.");
    Ok(())
}

pub async fn run(config_path: &Path) -> Result<()> {
    info!("starting librarian server");

    let config = config::load_config(config_path)
        .await
        .context("failed to load configuration")?;

    info!(path = %config_path.display(), "configuration loaded");

    let db = Database::new(&config.database_url)
        .await
        .context("failed to initialize database")?;
    info!("database connection established");

    let stores = build_stores(&db, &config).await?;

    let ctx = Arc::new(TaskContext::new(db.clone(), stores.clone(), config.clone()));
    let entries = background_entries(&config.background);
    let task_count = entries.len();
    let task_handles = scheduler::spawn_all(ctx, entries);
    info!(tasks = task_count, "background scheduler started");

    let http_server = HttpServer::new(db, stores, config.clone());
    let http_handle = tokio::spawn(async move {
        if let Err(e) = http_server.run().await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    info!(port = config.http_port, "librarian server is running; press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    http_handle.abort();
    for handle in task_handles {
        handle.abort();
    }

    Ok(())
}

/// Create each configured store's root directory and reconcile it into the
/// `stores` table, then build the live `StoreManager` handles background
/// tasks and the HTTP server share.
async fn build_stores(db: &Database, config: &Config) -> Result<HashMap<String, Arc<dyn StoreManager>>> {
    let mut stores: HashMap<String, Arc<dyn StoreManager>> = HashMap::new();

    for store_config in &config.stores {
        tokio::fs::create_dir_all(&store_config.root)
            .await
            .with_context(|| format!("failed to create store root for '{}'", store_config.name))?;

        if db.get_store_by_name(&store_config.name).await?.is_none() {
            db.create_store(
                &store_config.name,
                &store_config.store_type,
                serde_json::json!({}),
                &store_config.transfer_managers,
                &store_config.async_transfer_managers,
                store_config.ingestable,
                store_config.enabled,
            )
            .await
            .with_context(|| format!("failed to register store '{}'", store_config.name))?;
            info!(store = %store_config.name, "registered new store");
        }

        let manager: Arc<dyn StoreManager> = Arc::new(LocalStore::new(
            store_config.name.clone(),
            store_config.root.clone(),
            store_config.enabled,
        ));
        stores.insert(store_config.name.clone(), manager);
    }

    Ok(stores)
}

/// Turn `Config.background`'s task sections into the scheduler's flat
/// `(Task, TaskSchedule)` list, indexing same-kind entries so log lines
/// stay distinguishable (`"check_integrity[0]"`, `"check_integrity[1]"`...).
fn background_entries(background: &librarian_core::config::BackgroundSettings) -> Vec<(Box<dyn Task>, TaskSchedule)> {
    let mut entries: Vec<(Box<dyn Task>, TaskSchedule)> = Vec::new();

    for (i, settings) in background.check_integrity.iter().enumerate() {
        let schedule = settings.schedule.clone();
        entries.push((
            Box::new(CheckIntegrity::new(format!("check_integrity[{i}]"), settings.clone())),
            schedule,
        ));
    }

    for (i, settings) in background.create_local_clone.iter().enumerate() {
        let schedule = settings.schedule.clone();
        entries.push((
            Box::new(CreateLocalClone::new(format!("create_local_clone[{i}]"), settings.clone())),
            schedule,
        ));
    }

    for (i, settings) in background.send_clone.iter().enumerate() {
        let schedule = settings.schedule.clone();
        entries.push((
            Box::new(SendClone::new(format!("send_clone[{i}]"), settings.clone())),
            schedule,
        ));
    }

    if let Some(settings) = &background.receive_clone {
        let schedule = settings.schedule.clone();
        entries.push((Box::new(ReceiveClone::new("receive_clone", settings.clone())), schedule));
    }

    if let Some(settings) = &background.outgoing_transfer_hypervisor {
        let schedule = settings.schedule.clone();
        entries.push((
            Box::new(OutgoingTransferHypervisor::new("outgoing_transfer_hypervisor", settings.clone())),
            schedule,
        ));
    }

    if let Some(settings) = &background.incoming_transfer_hypervisor {
        let schedule = settings.schedule.clone();
        entries.push((
            Box::new(IncomingTransferHypervisor::new("incoming_transfer_hypervisor", settings.clone())),
            schedule,
        ));
    }

    if let Some(schedule) = &background.duplicate_remote_instance_hypervisor {
        entries.push((
            Box::new(DuplicateRemoteInstanceHypervisor::new(
                "duplicate_remote_instance_hypervisor",
                schedule.clone(),
            )),
            schedule.clone(),
        ));
    }

    for (i, settings) in background.rolling_deletion.iter().enumerate() {
        let schedule = settings.schedule.clone();
        entries.push((
            Box::new(RollingDeletion::new(format!("rolling_deletion[{i}]"), settings.clone())),
            schedule,
        ));
    }

    // Send-queue draining runs regardless of which other tasks are
    // configured, on a short fixed interval rather than an operator-tunable
    // one; any librarian with an enabled store can originate a send.
    let queue_schedule = TaskSchedule {
        enabled: true,
        every_seconds: 15,
        soft_timeout_seconds: 30,
    };
    entries.push((
        Box::new(ConsumeSendQueue::new("consume_send_queue")),
        queue_schedule.clone(),
    ));
    entries.push((Box::new(CheckSendQueue::new("check_send_queue")), queue_schedule));

    entries
}
