//! Consumer-side send-queue processing: claim a row, drive its transfer
//! manager forward by one step, and record what changed.
//!
//! Grounded on `original_source/librarian_background/queues.py`'s
//! `consume_queue_item`/`check_on_consumed`. Unlike the source, which loops
//! over every consumed-but-incomplete row in a single call,
//! `check_on_consumed` here advances exactly one row per call: a row whose
//! transfer manager hasn't progressed since the last tick would otherwise
//! be re-reserved and re-checked in a tight loop with nothing new to do.
//! The scheduler's own tick interval is what drives repeated polling.

use std::collections::HashMap;

use async_trait::async_trait;
use librarian_client::CheckinUpdateRequest;
use librarian_core::error::Result;
use librarian_core::types::{TransferPath, TransferStatus};

use crate::transfer_manager::{batch_transfer, transfer_status};
use crate::{Task, TaskContext};

/// Drives `consume_queue_item` on its own interval.
pub struct ConsumeSendQueue {
    name: String,
}

impl ConsumeSendQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Task for ConsumeSendQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &TaskContext, _deadline: std::time::Instant) -> Result<bool> {
        consume_queue_item(ctx).await
    }
}

/// Drives `check_on_consumed` on its own interval.
pub struct CheckSendQueue {
    name: String,
}

impl CheckSendQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Task for CheckSendQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &TaskContext, _deadline: std::time::Instant) -> Result<bool> {
        check_on_consumed(ctx).await
    }
}

/// Claim the next unconsumed send-queue row and attempt to move its bytes.
/// Only `consumed`/the manager's own state are touched here: transfer status
/// is the completion checker's job, once the manager actually reports done.
/// Returns `true` if a row was claimed (regardless of whether the attempt
/// succeeded outright), `false` if the queue was empty.
pub async fn consume_queue_item(ctx: &TaskContext) -> Result<bool> {
    let Some(mut item) = ctx.db.reserve_next().await? else {
        return Ok(false);
    };

    let mut transfers = Vec::with_capacity(item.transfer_ids.len());
    for id in &item.transfer_ids {
        if let Some(transfer) = ctx.db.get_outgoing_transfer(*id).await? {
            if let (Some(source_path), Some(dest_path)) =
                (transfer.source_path.clone(), transfer.dest_path.clone())
            {
                transfers.push(TransferPath { source_path, dest_path });
            }
        }
    }

    let attempt = batch_transfer(&mut item.async_transfer_manager, &transfers).await;
    ctx.db
        .update_send_queue_manager(item.id, &item.async_transfer_manager)
        .await?;

    if let Err(err) = attempt {
        // Not a permanent failure: leave the row for another attempt,
        // same as the source's "increment retries, try again later".
        tracing::warn!(send_queue_id = item.id, error = %err, "send queue transfer attempt failed, will retry");
        ctx.db.increment_send_queue_retries(item.id).await?;
        ctx.db.requeue_send_queue_item(item.id).await?;
    }

    Ok(true)
}

/// Re-check exactly one consumed, not-yet-completed row's progress. On a
/// manager that has finished copying bytes, the row only reaches STAGED
/// here: COMPLETED is reserved for once a `RemoteInstance` actually exists,
/// which only happens after the destination's own `clone/complete` callback.
/// The destination's matching `IncomingTransfer`s are moved to STAGED too,
/// via `checkin/update`, so its `ReceiveClone` task can pick them up.
pub async fn check_on_consumed(ctx: &TaskContext) -> Result<bool> {
    let Some(item) = ctx.db.reserve_next_completed_check().await? else {
        return Ok(false);
    };

    let status = transfer_status(&item.async_transfer_manager, item.transfer_ids.len());
    match status {
        TransferStatus::Completed => {
            ctx.db.mark_send_queue_completed(item.id).await?;
            for id in &item.transfer_ids {
                mark_outgoing_terminal(ctx, *id, TransferStatus::Staged).await?;
            }
            notify_destination_staged(ctx, &item.destination, &item.transfer_ids).await?;
        }
        TransferStatus::Failed | TransferStatus::Cancelled => {
            ctx.db.mark_send_queue_failed(item.id).await?;
            for id in &item.transfer_ids {
                mark_outgoing_terminal(ctx, *id, TransferStatus::Failed).await?;
            }
        }
        // Still in flight: leave it consumed and uncompleted for the next tick.
        _ => {}
    }

    Ok(true)
}

/// Tell `destination` that every transfer in `transfer_ids` has landed, so it
/// can move its own `IncomingTransfer` records from ONGOING to STAGED.
async fn notify_destination_staged(ctx: &TaskContext, destination: &str, transfer_ids: &[i64]) -> Result<()> {
    let Some(librarian) = ctx.db.get_librarian_by_name(destination).await? else {
        tracing::warn!(destination, "send queue destination no longer registered, cannot notify");
        return Ok(());
    };

    let mut destination_transfer_updates = HashMap::new();
    for id in transfer_ids {
        if let Some(transfer) = ctx.db.get_outgoing_transfer(*id).await? {
            if let Some(remote_id) = transfer.remote_transfer_id {
                destination_transfer_updates.insert(remote_id, TransferStatus::Staged);
            }
        }
    }

    if destination_transfer_updates.is_empty() {
        return Ok(());
    }

    let client = ctx.client_for(&librarian)?;
    client
        .checkin_update(&CheckinUpdateRequest {
            source_transfer_updates: HashMap::new(),
            destination_transfer_updates,
        })
        .await?;

    Ok(())
}

/// The forward, non-terminal leg of the transfer lattice. `Completed`/
/// `Failed`/`Cancelled` short-circuit this by transitioning directly from
/// wherever the row currently sits.
const FORWARD_CHAIN: [TransferStatus; 4] = [
    TransferStatus::Initiated,
    TransferStatus::Ongoing,
    TransferStatus::Staged,
    TransferStatus::Completed,
];

/// Step an outgoing transfer forward, one legal transition at a time, until
/// it reaches `to`. `Failed`/`Cancelled` are always a single direct step; any
/// other target is reached by walking `FORWARD_CHAIN`.
async fn mark_outgoing_terminal(ctx: &TaskContext, id: i64, to: TransferStatus) -> Result<()> {
    let Some(mut transfer) = ctx.db.get_outgoing_transfer(id).await? else {
        return Ok(());
    };

    if transfer.status.is_terminal() || transfer.status == to {
        return Ok(());
    }

    if matches!(to, TransferStatus::Failed | TransferStatus::Cancelled) {
        ctx.db.set_outgoing_transfer_status(id, transfer.status, to).await?;
        return Ok(());
    }

    let Some(current_index) = FORWARD_CHAIN.iter().position(|s| *s == transfer.status) else {
        return Ok(());
    };
    let Some(target_index) = FORWARD_CHAIN.iter().position(|s| *s == to) else {
        return Ok(());
    };

    for step in FORWARD_CHAIN.iter().skip(current_index + 1).take(target_index - current_index) {
        ctx.db.set_outgoing_transfer_status(id, transfer.status, *step).await?;
        transfer.status = *step;
    }

    Ok(())
}
