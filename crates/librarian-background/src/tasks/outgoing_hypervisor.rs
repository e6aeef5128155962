//! Reconcile outgoing transfers that have sat stale for too long: ask the
//! destination directly whether it actually has the file.
//!
//! Grounded on `original_source/librarian_background/hypervisor.py`'s
//! `OutgoingTransferHypervisor`.

use std::time::Instant;

use async_trait::async_trait;
use librarian_client::SearchFileRequest;
use librarian_core::config::HypervisorSettings;
use librarian_core::error::Result;
use librarian_core::types::{ErrorCategory, ErrorSeverity, TransferStatus};

use crate::task::past_deadline;
use crate::{Task, TaskContext};

pub struct OutgoingTransferHypervisor {
    name: String,
    settings: HypervisorSettings,
}

impl OutgoingTransferHypervisor {
    pub fn new(name: impl Into<String>, settings: HypervisorSettings) -> Self {
        Self { name: name.into(), settings }
    }
}

#[async_trait]
impl Task for OutgoingTransferHypervisor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &TaskContext, deadline: Instant) -> Result<bool> {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(self.settings.age_in_days);
        let stale = ctx.db.list_stale_outgoing_transfers(cutoff).await?;

        let mut all_resolved = true;
        for transfer in stale {
            if past_deadline(deadline) {
                tracing::debug!(task = %self.name, "outgoing_transfer_hypervisor past its soft timeout, yielding before the next transfer");
                return Ok(false);
            }

            if let Err(err) = self.reconcile_one(ctx, &transfer).await {
                all_resolved = false;
                tracing::warn!(task = %self.name, outgoing_transfer = transfer.id, error = %err, "could not reconcile stale outgoing transfer");
            }
        }

        Ok(all_resolved)
    }
}

impl OutgoingTransferHypervisor {
    async fn reconcile_one(&self, ctx: &TaskContext, transfer: &librarian_core::types::OutgoingTransfer) -> Result<()> {
        let Some(librarian) = ctx.db.get_librarian_by_name(&transfer.destination).await? else {
            ctx.db
                .set_outgoing_transfer_status(transfer.id, transfer.status, TransferStatus::Failed)
                .await?;
            return Ok(());
        };
        let client = ctx.client_for(&librarian)?;

        let found = client
            .search_file(&SearchFileRequest {
                name: Some(transfer.file_name.clone()),
                max_results: Some(1),
                ..Default::default()
            })
            .await?;

        let has_matching_copy = found.iter().any(|f| f.name == transfer.file_name && f.checksum == transfer.transfer_checksum);

        if has_matching_copy {
            let remote_store_id = found
                .iter()
                .flat_map(|f| f.instances.iter())
                .find(|i| i.available)
                .map(|i| i.id)
                .unwrap_or_default();

            if ctx
                .db
                .find_remote_instance(&transfer.file_name, &transfer.destination, remote_store_id)
                .await?
                .is_none()
            {
                ctx.db
                    .create_remote_instance(&transfer.file_name, &transfer.destination, remote_store_id, &ctx.config.site_name)
                    .await?;
            }
            ctx.db
                .set_outgoing_transfer_status(transfer.id, transfer.status, TransferStatus::Completed)
                .await?;
        } else {
            ctx.db
                .set_outgoing_transfer_status(transfer.id, transfer.status, TransferStatus::Failed)
                .await?;
            ctx.db
                .raise_error(
                    ErrorSeverity::Warning,
                    ErrorCategory::Transfer,
                    &format!(
                        "outgoing transfer {} to '{}' timed out and the destination has no matching copy of '{}'",
                        transfer.id, transfer.destination, transfer.file_name
                    ),
                )
                .await?;
        }

        Ok(())
    }
}
