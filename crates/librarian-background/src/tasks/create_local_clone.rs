//! Cross-store local replication: copy files that exist on one store but
//! not yet on any of a configured set of destination stores.
//!
//! Grounded on `original_source/librarian_background/create_clone.py`.

use std::time::Instant;

use async_trait::async_trait;
use librarian_core::config::CreateLocalCloneSettings;
use librarian_core::error::{LibrarianError, Result};
use librarian_core::types::DeletionPolicy;

use crate::task::past_deadline;
use crate::{Task, TaskContext};

pub struct CreateLocalClone {
    name: String,
    settings: CreateLocalCloneSettings,
}

impl CreateLocalClone {
    pub fn new(name: impl Into<String>, settings: CreateLocalCloneSettings) -> Self {
        Self { name: name.into(), settings }
    }
}

#[async_trait]
impl Task for CreateLocalClone {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &TaskContext, deadline: Instant) -> Result<bool> {
        let Some(from_store_row) = ctx.db.get_store_by_name(&self.settings.from_store).await? else {
            tracing::warn!(task = %self.name, store = %self.settings.from_store, "create_local_clone source store unknown");
            return Ok(true);
        };
        let Ok(from) = ctx.store(&self.settings.from_store) else {
            return Ok(true);
        };

        let mut to_rows = Vec::new();
        for name in &self.settings.to_stores {
            if let Some(row) = ctx.db.get_store_by_name(name).await? {
                to_rows.push(row);
            }
        }
        let to_ids: Vec<i64> = to_rows.iter().map(|s| s.id).collect();
        if to_ids.is_empty() {
            return Ok(true);
        }

        let cutoff = chrono::Utc::now() - chrono::Duration::days(self.settings.age_in_days);
        let candidates: Vec<_> = ctx
            .db
            .instances_missing_on_stores(from_store_row.id, &to_ids, i64::from(self.settings.files_per_run))
            .await?
            .into_iter()
            .filter(|i| i.created_time < cutoff)
            .collect();

        let mut all_processed = true;
        for instance in candidates {
            if past_deadline(deadline) {
                tracing::debug!(task = %self.name, "create_local_clone past its soft timeout, yielding before the next instance");
                return Ok(false);
            }

            match self.clone_one(ctx, &from, &to_rows, &instance).await {
                Ok(()) => {}
                Err(err) => {
                    all_processed = false;
                    tracing::warn!(task = %self.name, instance = instance.id, error = %err, "local clone attempt failed");
                }
            }
        }

        Ok(all_processed)
    }
}

impl CreateLocalClone {
    async fn clone_one(
        &self,
        ctx: &TaskContext,
        from: &std::sync::Arc<dyn librarian_store::StoreManager>,
        to_rows: &[librarian_core::types::Store],
        instance: &librarian_core::types::Instance,
    ) -> Result<()> {
        let file = ctx
            .db
            .get_file(&instance.file_name)
            .await?
            .ok_or_else(|| LibrarianError::Programming(format!("instance {} has no file row", instance.id)))?;

        let mut chosen = None;
        for row in to_rows {
            if !row.enabled {
                continue;
            }
            let Ok(dest) = ctx.store(&row.name) else { continue };
            if !dest.available() {
                continue;
            }
            match dest.free_space() {
                Ok(free) if free >= file.size => {
                    chosen = Some((row, dest));
                    break;
                }
                Ok(_) => {
                    if self.settings.disable_store_on_full {
                        ctx.db.set_store_enabled(row.id, false).await?;
                        tracing::warn!(store = %row.name, "disabling store, insufficient free space for local clone");
                    }
                }
                Err(_) => continue,
            }
        }

        let Some((dest_row, dest)) = chosen else {
            return Err(LibrarianError::StoreFull(format!(
                "no destination store could admit file '{}'",
                file.name
            )));
        };

        let clone_transfer = ctx
            .db
            .create_clone_transfer(&file.name, instance.store_id, dest_row.id)
            .await?;

        let result = self.copy_and_commit(ctx, from, &dest, &file, instance, clone_transfer.id).await;
        match &result {
            Ok(()) => {
                ctx.db
                    .set_clone_transfer_status(
                        clone_transfer.id,
                        librarian_core::types::TransferStatus::Initiated,
                        librarian_core::types::TransferStatus::Completed,
                    )
                    .await
                    .ok();
            }
            Err(_) => {
                ctx.db
                    .set_clone_transfer_status(
                        clone_transfer.id,
                        librarian_core::types::TransferStatus::Initiated,
                        librarian_core::types::TransferStatus::Failed,
                    )
                    .await
                    .ok();
            }
        }
        result
    }

    async fn copy_and_commit(
        &self,
        ctx: &TaskContext,
        from: &std::sync::Arc<dyn librarian_store::StoreManager>,
        dest: &std::sync::Arc<dyn librarian_store::StoreManager>,
        file: &librarian_core::types::File,
        instance: &librarian_core::types::Instance,
        clone_transfer_id: i64,
    ) -> Result<()> {
        let source_path = from.resolve_path_store(std::path::Path::new(&instance.path))?;
        let (staging_relative, staging_absolute) = dest.stage(file.size, &file.name).await?;
        ctx.db
            .set_clone_transfer_staging(clone_transfer_id, &staging_relative.to_string_lossy())
            .await?;

        if let Err(err) = tokio::fs::copy(&source_path, &staging_absolute).await {
            dest.unstage(&staging_relative).await.ok();
            return Err(err.into());
        }

        let info = dest.path_info(&staging_absolute, file.checksum.algorithm).await?;
        if info.checksum != file.checksum || info.size != file.size {
            dest.unstage(&staging_relative).await.ok();
            return Err(LibrarianError::DataIntegrity(format!(
                "checksum mismatch cloning '{}' onto {}",
                file.name,
                dest.name()
            )));
        }

        dest.reserve(&file.name)?;
        dest.commit(&staging_relative, std::path::Path::new(&file.name)).await?;

        let store_row = ctx
            .db
            .get_store_by_name(dest.name())
            .await?
            .ok_or_else(|| LibrarianError::Programming(format!("store '{}' has no row", dest.name())))?;

        ctx.db
            .create_instance(&file.name, store_row.id, &file.name, DeletionPolicy::Allowed)
            .await?;

        Ok(())
    }
}
