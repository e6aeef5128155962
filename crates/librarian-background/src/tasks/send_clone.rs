//! Offer newly-written files to a peer librarian for replication.
//!
//! Grounded on `original_source/librarian_background/send_clone.py` and
//! `hera_librarian/client.py`'s `clone/batch_stage` contract.

use std::collections::HashMap;

use async_trait::async_trait;
use librarian_client::{CheckinUpdateRequest, CloneBatchStageRequest, CloneStageRequest};
use librarian_core::config::SendCloneSettings;
use librarian_core::error::{LibrarianError, Result};
use librarian_core::types::{File, Instance, TransferStatus};

use crate::{Task, TaskContext};

pub struct SendClone {
    name: String,
    settings: SendCloneSettings,
}

impl SendClone {
    pub fn new(name: impl Into<String>, settings: SendCloneSettings) -> Self {
        Self { name: name.into(), settings }
    }
}

#[async_trait]
impl Task for SendClone {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &TaskContext, _deadline: std::time::Instant) -> Result<bool> {
        let Some(librarian) = ctx.db.get_librarian_by_name(&self.settings.destination).await? else {
            tracing::warn!(task = %self.name, destination = %self.settings.destination, "send_clone destination unknown");
            return Ok(true);
        };
        if !librarian.transfers_enabled {
            return Ok(true);
        }
        let client = ctx.client_for(&librarian)?;

        let preferred_store_id = match &self.settings.store_preference {
            Some(name) => ctx.db.get_store_by_name(name).await?.map(|s| s.id),
            None => None,
        };

        let cutoff = chrono::Utc::now() - chrono::Duration::days(self.settings.age_in_days);
        let files = ctx
            .db
            .files_eligible_for_send_clone(cutoff, &self.settings.destination, i64::from(self.settings.send_batch_size))
            .await?;

        if files.is_empty() {
            return Ok(true);
        }

        // Steps 1-2: pick one available instance per file, preferring the
        // configured store, and open an OutgoingTransfer for it.
        let mut outgoing_ids = Vec::new();
        let mut by_outgoing_id: HashMap<i64, (File, Instance)> = HashMap::new();
        for file in &files {
            let instances = ctx.db.instances_for_file(&file.name).await?;
            let chosen = preferred_store_id
                .and_then(|id| instances.iter().find(|i| i.available && i.store_id == id))
                .or_else(|| instances.iter().find(|i| i.available));

            let Some(instance) = chosen else { continue };

            let outgoing = ctx
                .db
                .create_outgoing_transfer(&file.name, &self.settings.destination, Some(instance.id), file.size, &file.checksum)
                .await?;
            outgoing_ids.push(outgoing.id);
            by_outgoing_id.insert(outgoing.id, (file.clone(), instance.clone()));
        }

        if outgoing_ids.is_empty() {
            return Ok(true);
        }

        // Step 3: ask the destination to stage all of them at once.
        let uploads: Vec<CloneStageRequest> = outgoing_ids
            .iter()
            .map(|id| {
                let (file, _instance) = &by_outgoing_id[id];
                CloneStageRequest {
                    upload_name: file.name.clone(),
                    destination_location: file.name.clone(),
                    upload_size: file.size,
                    upload_checksum: file.checksum.clone(),
                    source_transfer_id: *id,
                    source_name: ctx.config.site_name.clone(),
                }
            })
            .collect();

        let staged = match client.clone_batch_stage(&CloneBatchStageRequest { uploads }).await {
            Ok(response) => response,
            Err(err) => {
                for id in &outgoing_ids {
                    ctx.db
                        .set_outgoing_transfer_status(*id, TransferStatus::Initiated, TransferStatus::Failed)
                        .await
                        .ok();
                }
                return Err(err);
            }
        };

        // Step 4: reconcile accepted vs rejected transfers, filling in the
        // paths the local send-queue worker will need to move bytes.
        let mut accepted = Vec::new();
        for id in &outgoing_ids {
            let Some((file, instance)) = by_outgoing_id.get(id) else { continue };
            match staged.uploads.get(id) {
                Some(item) => {
                    ctx.db.set_outgoing_transfer_remote_id(*id, item.destination_transfer_id).await?;

                    let source_path = match ctx.db.get_store(instance.store_id).await? {
                        Some(store_row) => ctx
                            .store(&store_row.name)
                            .and_then(|store| store.resolve_path_store(std::path::Path::new(&instance.path)))
                            .map(|p| p.to_string_lossy().into_owned())
                            .unwrap_or_else(|_| instance.path.clone()),
                        None => instance.path.clone(),
                    };

                    ctx.db
                        .set_outgoing_transfer_paths(*id, &source_path, &item.staging_location)
                        .await?;
                    accepted.push((*id, item.clone(), file.clone()));
                }
                None => {
                    ctx.db
                        .set_outgoing_transfer_status(*id, TransferStatus::Initiated, TransferStatus::Failed)
                        .await
                        .ok();
                }
            }
        }

        if accepted.is_empty() {
            return Ok(true);
        }

        // Step 5: pick the first valid async transfer provider the peer offered.
        let provider = accepted
            .iter()
            .flat_map(|(_, item, _)| item.async_transfer_providers.values())
            .find(|m| m.kind() == "local")
            .cloned();

        let Some(provider) = provider else {
            for (id, ..) in &accepted {
                ctx.db
                    .set_outgoing_transfer_status(*id, TransferStatus::Initiated, TransferStatus::Failed)
                    .await
                    .ok();
            }
            return Err(LibrarianError::Configuration(format!(
                "destination '{}' offered no usable transfer provider",
                self.settings.destination
            )));
        };

        // Step 6: bind a send-queue row to all accepted transfers.
        let transfer_ids: Vec<i64> = accepted.iter().map(|(id, ..)| *id).collect();
        ctx.db
            .create_send_queue_item(0, &self.settings.destination, &provider, &transfer_ids)
            .await?;

        // Step 7: tell the peer to mark its side ongoing, then mirror locally.
        let mut destination_updates = HashMap::new();
        for (_, item, _) in &accepted {
            destination_updates.insert(item.destination_transfer_id, TransferStatus::Ongoing);
        }
        client
            .checkin_update(&CheckinUpdateRequest {
                source_transfer_updates: HashMap::new(),
                destination_transfer_updates: destination_updates,
            })
            .await?;

        for id in &transfer_ids {
            ctx.db
                .set_outgoing_transfer_status(*id, TransferStatus::Initiated, TransferStatus::Ongoing)
                .await?;
        }

        Ok(true)
    }
}
