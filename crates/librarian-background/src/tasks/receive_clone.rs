//! Finish incoming clones whose bytes have already landed in staging:
//! commit them into the destination store and tell the source they're done.
//!
//! Grounded on `original_source/librarian_background/receive_clone.py`.

use std::time::Instant;

use async_trait::async_trait;
use librarian_client::CloneCompleteRequest;
use librarian_core::config::ReceiveCloneSettings;
use librarian_core::error::{LibrarianError, Result};
use librarian_core::types::{DeletionPolicy, IncomingTransfer, TransferStatus};

use crate::task::past_deadline;
use crate::{Task, TaskContext};

pub struct ReceiveClone {
    name: String,
    settings: ReceiveCloneSettings,
}

impl ReceiveClone {
    pub fn new(name: impl Into<String>, settings: ReceiveCloneSettings) -> Self {
        Self { name: name.into(), settings }
    }
}

#[async_trait]
impl Task for ReceiveClone {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &TaskContext, deadline: Instant) -> Result<bool> {
        let staged = ctx.db.list_incoming_transfers_by_status(TransferStatus::Staged).await?;

        let mut all_processed = true;
        for transfer in staged.into_iter().take(self.settings.files_per_run as usize) {
            if past_deadline(deadline) {
                tracing::debug!(task = %self.name, "receive_clone past its soft timeout, yielding before the next transfer");
                return Ok(false);
            }

            if let Err(err) = self.ingest_one(ctx, &transfer).await {
                all_processed = false;
                tracing::warn!(task = %self.name, incoming_transfer = transfer.id, error = %err, "failed to ingest staged clone");
            }
        }

        Ok(all_processed)
    }
}

impl ReceiveClone {
    async fn ingest_one(&self, ctx: &TaskContext, transfer: &IncomingTransfer) -> Result<()> {
        let store_id = transfer
            .store_id
            .ok_or_else(|| LibrarianError::Programming(format!("incoming transfer {} has no store_id", transfer.id)))?;
        let staging_path = transfer
            .staging_path
            .as_deref()
            .ok_or_else(|| LibrarianError::Programming(format!("incoming transfer {} has no staging_path", transfer.id)))?;

        let store_row = ctx
            .db
            .get_store(store_id)
            .await?
            .ok_or_else(|| LibrarianError::Programming(format!("store {store_id} has no row")))?;
        let store = ctx.store(&store_row.name)?;

        let staging_relative = std::path::Path::new(staging_path);
        let staging_absolute = store.resolve_path_staging(staging_relative)?;
        let info = store.path_info(&staging_absolute, transfer.transfer_checksum.algorithm).await?;
        if info.checksum != transfer.transfer_checksum || info.size != transfer.transfer_size {
            store.unstage(staging_relative).await.ok();
            ctx.db
                .set_incoming_transfer_status(transfer.id, transfer.status, TransferStatus::Failed)
                .await
                .ok();
            return Err(LibrarianError::DataIntegrity(format!(
                "staged upload '{}' failed checksum verification on commit",
                transfer.upload_name
            )));
        }

        let store_path = std::path::Path::new(&transfer.upload_name);
        store.reserve(&transfer.upload_name)?;
        store.commit(staging_relative, store_path).await?;
        ctx.db.set_incoming_transfer_store_path(transfer.id, &transfer.upload_name).await?;

        let file = librarian_core::types::File {
            name: transfer.upload_name.clone(),
            size: transfer.transfer_size,
            checksum: transfer.transfer_checksum.clone(),
            uploader: transfer.uploader.clone(),
            source: transfer.source.clone(),
            create_time: chrono::Utc::now(),
        };
        ctx.db
            .complete_ingest(
                &file,
                store_id,
                &transfer.upload_name,
                DeletionPolicy::Allowed,
                transfer.id,
                transfer.status,
                TransferStatus::Completed,
            )
            .await?;

        if let Some(source_transfer_id) = transfer.source_transfer_id {
            if let Some(librarian) = ctx.db.get_librarian_by_name(&transfer.source).await? {
                let client = ctx.client_for(&librarian)?;
                client
                    .clone_complete(&CloneCompleteRequest {
                        source_transfer_id,
                        destination_transfer_id: transfer.id,
                        remote_store_id: store_id,
                    })
                    .await?;
            }
        }

        Ok(())
    }
}
