//! Reconcile incoming transfers that have sat stale for too long against the
//! source librarian's own view of the transfer.
//!
//! Grounded on `original_source/librarian_background/hypervisor.py`'s
//! `IncomingTransferHypervisor`.

use std::time::Instant;

use async_trait::async_trait;
use librarian_client::CheckinStatusRequest;
use librarian_core::config::HypervisorSettings;
use librarian_core::error::Result;
use librarian_core::types::{IncomingTransfer, TransferStatus};

use crate::task::past_deadline;
use crate::{Task, TaskContext};

pub struct IncomingTransferHypervisor {
    name: String,
    settings: HypervisorSettings,
}

impl IncomingTransferHypervisor {
    pub fn new(name: impl Into<String>, settings: HypervisorSettings) -> Self {
        Self { name: name.into(), settings }
    }
}

#[async_trait]
impl Task for IncomingTransferHypervisor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &TaskContext, deadline: Instant) -> Result<bool> {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(self.settings.age_in_days);
        let stale = ctx.db.list_stale_incoming_transfers(cutoff).await?;

        let mut all_resolved = true;
        for transfer in stale {
            if past_deadline(deadline) {
                tracing::debug!(task = %self.name, "incoming_transfer_hypervisor past its soft timeout, yielding before the next transfer");
                return Ok(false);
            }

            if let Err(err) = self.reconcile_one(ctx, &transfer).await {
                all_resolved = false;
                tracing::warn!(task = %self.name, incoming_transfer = transfer.id, error = %err, "could not reconcile stale incoming transfer");
            }
        }

        Ok(all_resolved)
    }
}

impl IncomingTransferHypervisor {
    async fn reconcile_one(&self, ctx: &TaskContext, transfer: &IncomingTransfer) -> Result<()> {
        let Some(source_transfer_id) = transfer.source_transfer_id else {
            ctx.db
                .set_incoming_transfer_status(transfer.id, transfer.status, TransferStatus::Failed)
                .await?;
            return Ok(());
        };
        let Some(librarian) = ctx.db.get_librarian_by_name(&transfer.source).await? else {
            ctx.db
                .set_incoming_transfer_status(transfer.id, transfer.status, TransferStatus::Failed)
                .await?;
            return Ok(());
        };
        let client = ctx.client_for(&librarian)?;

        let response = client
            .checkin_status(&CheckinStatusRequest {
                source_transfer_ids: vec![source_transfer_id],
                destination_transfer_ids: Vec::new(),
            })
            .await?;

        let peer_status = response.source_transfer_status.get(&source_transfer_id).copied().flatten();

        let Some(peer_status) = peer_status else {
            // The source has no memory of this transfer at all: it's gone for good.
            ctx.db
                .set_incoming_transfer_status(transfer.id, transfer.status, TransferStatus::Failed)
                .await?;
            return Ok(());
        };

        if peer_status == transfer.status {
            return Ok(());
        }

        match (peer_status, transfer.status) {
            (TransferStatus::Completed, ours) if !ours.is_terminal() => {
                ctx.db.set_incoming_transfer_status(transfer.id, ours, TransferStatus::Failed).await?;
            }
            (TransferStatus::Cancelled | TransferStatus::Failed, ours) if !ours.is_terminal() => {
                ctx.db.set_incoming_transfer_status(transfer.id, ours, TransferStatus::Failed).await?;
            }
            (TransferStatus::Staged, TransferStatus::Initiated) => {
                ctx.db.set_incoming_transfer_status(transfer.id, TransferStatus::Initiated, TransferStatus::Ongoing).await?;
                ctx.db.set_incoming_transfer_status(transfer.id, TransferStatus::Ongoing, TransferStatus::Staged).await?;
            }
            (TransferStatus::Staged, TransferStatus::Ongoing) => {
                ctx.db.set_incoming_transfer_status(transfer.id, TransferStatus::Ongoing, TransferStatus::Staged).await?;
            }
            (TransferStatus::Ongoing, TransferStatus::Initiated) => {
                ctx.db.set_incoming_transfer_status(transfer.id, TransferStatus::Initiated, TransferStatus::Ongoing).await?;
            }
            (TransferStatus::Initiated, TransferStatus::Ongoing) => {
                // We've raced ahead of the source's own bookkeeping: unreachable state.
                ctx.db
                    .set_incoming_transfer_status(transfer.id, TransferStatus::Ongoing, TransferStatus::Failed)
                    .await?;
            }
            // (Staged, Staged) and anything else already covered above by the
            // equality check; left alone for ReceiveClone or a later tick.
            _ => {}
        }

        Ok(())
    }
}
