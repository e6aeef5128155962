//! Remove duplicate `remote_instances` rows left behind by races between
//! `SendClone` and the hypervisor tasks reconciling the same peer.
//!
//! Grounded on `original_source/librarian_background/hypervisor.py`'s
//! `DuplicateRemoteInstanceHypervisor`.

use async_trait::async_trait;
use librarian_core::config::TaskSchedule;
use librarian_core::error::Result;

use crate::{Task, TaskContext};

pub struct DuplicateRemoteInstanceHypervisor {
    name: String,
    #[allow(dead_code)]
    settings: TaskSchedule,
}

impl DuplicateRemoteInstanceHypervisor {
    pub fn new(name: impl Into<String>, settings: TaskSchedule) -> Self {
        Self { name: name.into(), settings }
    }
}

#[async_trait]
impl Task for DuplicateRemoteInstanceHypervisor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &TaskContext, _deadline: std::time::Instant) -> Result<bool> {
        let removed = ctx.db.delete_duplicate_remote_instances().await?;
        if removed > 0 {
            tracing::info!(task = %self.name, removed, "deleted duplicate remote instances");
        }
        Ok(true)
    }
}
