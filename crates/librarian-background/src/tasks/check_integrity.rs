//! Periodic on-disk checksum verification for recently-written instances.
//!
//! Grounded on `original_source/librarian_background/check_integrity.py`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use librarian_core::config::CheckIntegritySettings;
use librarian_core::error::Result;
use librarian_core::types::{ErrorCategory, ErrorSeverity};

use crate::task::past_deadline;
use crate::{Task, TaskContext};

pub struct CheckIntegrity {
    name: String,
    settings: CheckIntegritySettings,
    cancelled: AtomicBool,
}

impl CheckIntegrity {
    pub fn new(name: impl Into<String>, settings: CheckIntegritySettings) -> Self {
        Self { name: name.into(), settings, cancelled: AtomicBool::new(false) }
    }
}

#[async_trait]
impl Task for CheckIntegrity {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    async fn run(&self, ctx: &TaskContext, deadline: Instant) -> Result<bool> {
        let store = match ctx.store(&self.settings.store) {
            Ok(store) => store,
            Err(_) => {
                // Unknown store: nothing sensible to check next tick either.
                // Cancel permanently rather than retrying every tick forever.
                tracing::warn!(task = %self.name, store = %self.settings.store, "check_integrity store no longer configured, cancelling permanently");
                self.cancelled.store(true, Ordering::Release);
                return Ok(true);
            }
        };
        let Some(store_row) = ctx.db.get_store_by_name(&self.settings.store).await? else {
            tracing::warn!(task = %self.name, store = %self.settings.store, "check_integrity store has no database row, cancelling permanently");
            self.cancelled.store(true, Ordering::Release);
            return Ok(true);
        };

        let cutoff = chrono::Utc::now() - chrono::Duration::days(self.settings.age_in_days);
        let instances = ctx.db.instances_on_store_created_after(store_row.id, cutoff).await?;

        let mut all_verified = true;
        for instance in instances {
            if past_deadline(deadline) {
                tracing::debug!(task = %self.name, "check_integrity past its soft timeout, yielding before the next instance");
                return Ok(false);
            }

            let Some(file) = ctx.db.get_file(&instance.file_name).await? else {
                continue;
            };

            let info = match store.resolve_path_store(std::path::Path::new(&instance.path)) {
                Ok(absolute) => store.path_info(&absolute, file.checksum.algorithm).await,
                Err(err) => Err(err),
            };
            match info {
                Ok(info) if info.checksum == file.checksum => {}
                Ok(info) => {
                    all_verified = false;
                    ctx.db
                        .record_corrupt_file(&file.name, instance.id, info.size, &info.checksum)
                        .await?;
                    ctx.db
                        .raise_error(
                            ErrorSeverity::Critical,
                            ErrorCategory::DataIntegrity,
                            &format!("instance {} of file '{}' failed checksum verification", instance.id, file.name),
                        )
                        .await?;
                }
                Err(err) => {
                    all_verified = false;
                    tracing::error!(instance = instance.id, file = %file.name, error = %err, "instance missing or unreadable during integrity check");
                    ctx.db
                        .raise_error(
                            ErrorSeverity::Error,
                            ErrorCategory::DataAvailability,
                            &format!("instance {} of file '{}' could not be read: {err}", instance.id, file.name),
                        )
                        .await?;
                }
            }
        }

        Ok(all_verified)
    }
}
