//! Capability operations on an `AsyncTransferManager` value: moving bytes for
//! the batch it was created with, and reporting on that batch's progress.
//!
//! Grounded on `original_source/hera_librarian/transfers.py`'s
//! `CoreTransferManager.batch_transfer`/`transfer_status`. Only the `Local`
//! variant is a working transport (`SPEC_FULL.md` §9); `Rsync`/`Globus` are
//! constructed and persisted so the wire shape round-trips, but calling them
//! returns a configuration error rather than shelling out.

use librarian_core::error::{LibrarianError, Result};
use librarian_core::types::{AsyncTransferManager, TransferPath, TransferStatus};

pub async fn batch_transfer(
    manager: &mut AsyncTransferManager,
    transfers: &[TransferPath],
) -> Result<()> {
    match manager {
        AsyncTransferManager::Local { completed } => {
            for transfer in transfers {
                if completed.contains(&transfer.dest_path) {
                    continue;
                }
                if let Some(parent) = std::path::Path::new(&transfer.dest_path).parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::copy(&transfer.source_path, &transfer.dest_path).await?;
                completed.push(transfer.dest_path.clone());
            }
            Ok(())
        }
        AsyncTransferManager::Rsync { .. } | AsyncTransferManager::Globus { .. } => {
            Err(LibrarianError::Configuration(format!(
                "the {} transfer manager has no working transport in this build",
                manager.kind()
            )))
        }
    }
}

/// Current status of the batch this manager was created with.
pub fn transfer_status(manager: &AsyncTransferManager, expected_count: usize) -> TransferStatus {
    match manager {
        AsyncTransferManager::Local { completed } => {
            if completed.len() >= expected_count {
                TransferStatus::Completed
            } else {
                TransferStatus::Initiated
            }
        }
        AsyncTransferManager::Rsync { remote_task_id, .. } => {
            if remote_task_id.is_some() {
                TransferStatus::Initiated
            } else {
                TransferStatus::Failed
            }
        }
        AsyncTransferManager::Globus { task_id, .. } => {
            if task_id.is_some() {
                TransferStatus::Initiated
            } else {
                TransferStatus::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn local_manager_copies_and_reports_completion() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("out/a.txt");
        tokio::fs::write(&src, b"hello").await.unwrap();

        let mut manager = AsyncTransferManager::Local { completed: vec![] };
        let transfers = vec![TransferPath {
            source_path: src.to_string_lossy().into_owned(),
            dest_path: dst.to_string_lossy().into_owned(),
        }];

        batch_transfer(&mut manager, &transfers).await.unwrap();
        assert_eq!(transfer_status(&manager, 1), TransferStatus::Completed);
        assert_eq!(tokio::fs::read(&dst).await.unwrap(), b"hello");
    }

    #[test]
    fn rsync_manager_without_task_id_reports_failed() {
        let manager = AsyncTransferManager::Rsync {
            remote_host: "peer".into(),
            remote_user: "librarian".into(),
            remote_task_id: None,
        };
        assert_eq!(transfer_status(&manager, 1), TransferStatus::Failed);
    }
}
