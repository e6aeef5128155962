//! Reclaim space on a store once enough remote librarians hold their own
//! copy of an instance's file.
//!
//! Grounded on `original_source/librarian_background/rolling_deletion.py`.

use std::time::Instant as StdInstant;

use async_trait::async_trait;
use librarian_client::{LibrarianClient, ValidateFileRequest};
use librarian_core::config::RollingDeletionSettings;
use librarian_core::error::Result;
use librarian_core::types::Instance;

use crate::task::past_deadline;
use crate::worker_pool::run_bounded;
use crate::{Task, TaskContext};

pub struct RollingDeletion {
    name: String,
    settings: RollingDeletionSettings,
}

impl RollingDeletion {
    pub fn new(name: impl Into<String>, settings: RollingDeletionSettings) -> Self {
        Self { name: name.into(), settings }
    }
}

#[async_trait]
impl Task for RollingDeletion {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &TaskContext, deadline: StdInstant) -> Result<bool> {
        let Some(store_row) = ctx.db.get_store_by_name(&self.settings.store).await? else {
            tracing::warn!(task = %self.name, store = %self.settings.store, "rolling_deletion store unknown");
            return Ok(true);
        };
        let Ok(store) = ctx.store(&self.settings.store) else {
            return Ok(true);
        };

        let clients: Vec<LibrarianClient> = {
            let mut clients = Vec::new();
            for librarian in ctx.db.list_librarians().await? {
                if let Ok(client) = ctx.client_for(&librarian) {
                    clients.push(client);
                }
            }
            clients
        };

        let cutoff = chrono::Utc::now() - chrono::Duration::days(self.settings.age_in_days);
        let instances = ctx.db.available_instances_older_than(store_row.id, cutoff).await?;

        let mut all_processed = true;
        for instance in instances {
            if past_deadline(deadline) {
                tracing::debug!(task = %self.name, "rolling_deletion past its soft timeout, yielding before the next instance");
                return Ok(false);
            }

            match self.process_one(ctx, &store, &clients, &instance).await {
                Ok(()) => {}
                Err(err) => {
                    all_processed = false;
                    tracing::warn!(task = %self.name, instance = instance.id, error = %err, "rolling deletion check failed");
                }
            }
        }

        Ok(all_processed)
    }
}

impl RollingDeletion {
    async fn process_one(
        &self,
        ctx: &TaskContext,
        store: &std::sync::Arc<dyn librarian_store::StoreManager>,
        clients: &[LibrarianClient],
        instance: &Instance,
    ) -> Result<()> {
        let verify_checksums = self.settings.verify_downstream_checksums;
        let file_name = instance.file_name.clone();

        let checks: Vec<(LibrarianClient, String)> =
            clients.iter().cloned().map(|client| (client, file_name.clone())).collect();

        let results = run_bounded(checks, ctx.config.background.validation_workers, {
            move |(client, file_name): (LibrarianClient, String)| async move {
                client
                    .validate_file(&ValidateFileRequest { file_name })
                    .await
                    .ok()
            }
        })
        .await;

        let downstream_copies = results
            .into_iter()
            .flatten()
            .filter(|items| {
                if verify_checksums {
                    items.iter().any(|item| item.computed_same_checksum)
                } else {
                    !items.is_empty()
                }
            })
            .count() as u32;

        if downstream_copies < self.settings.number_of_remote_copies {
            return Ok(());
        }

        if self.settings.force_deletion {
            let absolute = store.resolve_path_store(std::path::Path::new(&instance.path))?;
            store.delete(&absolute).await?;
            ctx.db.delete_instance(instance.id).await?;
        } else if self.settings.mark_unavailable {
            ctx.db.set_instance_available(instance.id, false).await?;
        }

        Ok(())
    }
}
