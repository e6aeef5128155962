//! CRUD and status transitions for `incoming_transfers`, `outgoing_transfers`
//! and `clone_transfers`.

use chrono::Utc;
use librarian_core::error::{LibrarianError, Result};
use librarian_core::types::{Checksum, CloneTransfer, IncomingTransfer, OutgoingTransfer, TransferStatus};

use crate::rows::{CloneTransferRow, IncomingTransferRow, OutgoingTransferRow};
use crate::Database;

impl Database {
    pub async fn create_incoming_transfer(
        &self,
        source: &str,
        uploader: &str,
        upload_name: &str,
        transfer_size: i64,
        transfer_checksum: &Checksum,
        transfer_manager_name: Option<&str>,
    ) -> Result<IncomingTransfer> {
        let row = sqlx::query_as::<_, IncomingTransferRow>(
            "INSERT INTO incoming_transfers \
             (status, source, uploader, upload_name, transfer_size, transfer_checksum, transfer_manager_name, start_time) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
        )
        .bind(TransferStatus::Initiated.to_string())
        .bind(source)
        .bind(uploader)
        .bind(upload_name)
        .bind(transfer_size)
        .bind(transfer_checksum.to_string())
        .bind(transfer_manager_name)
        .bind(Utc::now())
        .fetch_one(self.pool())
        .await?;

        IncomingTransfer::try_from(row).map_err(LibrarianError::Other)
    }

    pub async fn get_incoming_transfer(&self, id: i64) -> Result<Option<IncomingTransfer>> {
        let row =
            sqlx::query_as::<_, IncomingTransferRow>("SELECT * FROM incoming_transfers WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool())
                .await?;
        row.map(IncomingTransfer::try_from)
            .transpose()
            .map_err(LibrarianError::Other)
    }

    /// Find a non-terminal incoming transfer for the same
    /// `(transfer_checksum, source)` pair, used to detect a duplicate upload
    /// already in flight.
    pub async fn find_ongoing_incoming_transfer(
        &self,
        transfer_checksum: &Checksum,
        source: &str,
    ) -> Result<Option<IncomingTransfer>> {
        let row = sqlx::query_as::<_, IncomingTransferRow>(
            "SELECT * FROM incoming_transfers \
             WHERE transfer_checksum = $1 AND source = $2 \
             AND status NOT IN ('completed', 'failed', 'cancelled') \
             ORDER BY id DESC LIMIT 1",
        )
        .bind(transfer_checksum.to_string())
        .bind(source)
        .fetch_optional(self.pool())
        .await?;

        row.map(IncomingTransfer::try_from)
            .transpose()
            .map_err(LibrarianError::Other)
    }

    /// Find a non-terminal incoming transfer for the same
    /// `(transfer_checksum, destination_location)` pair, where
    /// `destination_location` is the name the bytes will be registered under
    /// on this server (stored in `upload_name`; see `SPEC_FULL.md` §9). Used
    /// by `upload/stage` and `clone/stage` admission to detect a duplicate
    /// transfer already in flight for the same final name.
    pub async fn find_ongoing_incoming_transfer_by_destination(
        &self,
        transfer_checksum: &Checksum,
        destination_location: &str,
    ) -> Result<Option<IncomingTransfer>> {
        let row = sqlx::query_as::<_, IncomingTransferRow>(
            "SELECT * FROM incoming_transfers \
             WHERE transfer_checksum = $1 AND upload_name = $2 \
             AND status NOT IN ('completed', 'failed', 'cancelled') \
             ORDER BY id DESC LIMIT 1",
        )
        .bind(transfer_checksum.to_string())
        .bind(destination_location)
        .fetch_optional(self.pool())
        .await?;

        row.map(IncomingTransfer::try_from)
            .transpose()
            .map_err(LibrarianError::Other)
    }

    /// Look up the incoming transfer a given source peer opened against us
    /// for `source_transfer_id`, used by `checkin/status` and `checkin/update`
    /// to resolve a peer-supplied id to our own row.
    pub async fn get_incoming_transfer_by_source_transfer_id(
        &self,
        source_transfer_id: i64,
    ) -> Result<Option<IncomingTransfer>> {
        let row = sqlx::query_as::<_, IncomingTransferRow>(
            "SELECT * FROM incoming_transfers WHERE source_transfer_id = $1 ORDER BY id DESC LIMIT 1",
        )
        .bind(source_transfer_id)
        .fetch_optional(self.pool())
        .await?;

        row.map(IncomingTransfer::try_from)
            .transpose()
            .map_err(LibrarianError::Other)
    }

    pub async fn set_incoming_transfer_source_transfer_id(
        &self,
        id: i64,
        source_transfer_id: i64,
    ) -> Result<()> {
        sqlx::query("UPDATE incoming_transfers SET source_transfer_id = $2 WHERE id = $1")
            .bind(id)
            .bind(source_transfer_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn set_incoming_transfer_status(
        &self,
        id: i64,
        from: TransferStatus,
        to: TransferStatus,
    ) -> Result<()> {
        if !from.can_transition_to(to) {
            return Err(LibrarianError::IllegalTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let end_time = to.is_terminal().then(Utc::now);
        sqlx::query("UPDATE incoming_transfers SET status = $2, end_time = COALESCE($3, end_time) WHERE id = $1")
            .bind(id)
            .bind(to.to_string())
            .bind(end_time)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn set_incoming_transfer_staging(
        &self,
        id: i64,
        store_id: i64,
        staging_path: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE incoming_transfers SET store_id = $2, staging_path = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(store_id)
        .bind(staging_path)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn set_incoming_transfer_store_path(&self, id: i64, store_path: &str) -> Result<()> {
        sqlx::query("UPDATE incoming_transfers SET store_path = $2 WHERE id = $1")
            .bind(id)
            .bind(store_path)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn list_incoming_transfers_by_status(
        &self,
        status: TransferStatus,
    ) -> Result<Vec<IncomingTransfer>> {
        let rows = sqlx::query_as::<_, IncomingTransferRow>(
            "SELECT * FROM incoming_transfers WHERE status = $1 ORDER BY id",
        )
        .bind(status.to_string())
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(IncomingTransfer::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(LibrarianError::Other)
    }

    pub async fn create_outgoing_transfer(
        &self,
        file_name: &str,
        destination: &str,
        instance_id: Option<i64>,
        transfer_size: i64,
        transfer_checksum: &Checksum,
    ) -> Result<OutgoingTransfer> {
        let row = sqlx::query_as::<_, OutgoingTransferRow>(
            "INSERT INTO outgoing_transfers \
             (status, file_name, destination, instance_id, transfer_size, transfer_checksum, start_time) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
        )
        .bind(TransferStatus::Initiated.to_string())
        .bind(file_name)
        .bind(destination)
        .bind(instance_id)
        .bind(transfer_size)
        .bind(transfer_checksum.to_string())
        .bind(Utc::now())
        .fetch_one(self.pool())
        .await?;

        OutgoingTransfer::try_from(row).map_err(LibrarianError::Other)
    }

    pub async fn get_outgoing_transfer(&self, id: i64) -> Result<Option<OutgoingTransfer>> {
        let row =
            sqlx::query_as::<_, OutgoingTransferRow>("SELECT * FROM outgoing_transfers WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool())
                .await?;
        row.map(OutgoingTransfer::try_from)
            .transpose()
            .map_err(LibrarianError::Other)
    }

    pub async fn set_outgoing_transfer_status(
        &self,
        id: i64,
        from: TransferStatus,
        to: TransferStatus,
    ) -> Result<()> {
        if !from.can_transition_to(to) {
            return Err(LibrarianError::IllegalTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let end_time = to.is_terminal().then(Utc::now);
        sqlx::query("UPDATE outgoing_transfers SET status = $2, end_time = COALESCE($3, end_time) WHERE id = $1")
            .bind(id)
            .bind(to.to_string())
            .bind(end_time)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn set_outgoing_transfer_paths(
        &self,
        id: i64,
        source_path: &str,
        dest_path: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE outgoing_transfers SET source_path = $2, dest_path = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(source_path)
        .bind(dest_path)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn set_outgoing_transfer_remote_id(&self, id: i64, remote_transfer_id: i64) -> Result<()> {
        sqlx::query("UPDATE outgoing_transfers SET remote_transfer_id = $2 WHERE id = $1")
            .bind(id)
            .bind(remote_transfer_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Outgoing transfers started before `cutoff` that are still non-terminal.
    pub async fn list_stale_outgoing_transfers(
        &self,
        cutoff: chrono::DateTime<Utc>,
    ) -> Result<Vec<OutgoingTransfer>> {
        let rows = sqlx::query_as::<_, OutgoingTransferRow>(
            "SELECT * FROM outgoing_transfers \
             WHERE start_time < $1 AND status NOT IN ('completed', 'failed', 'cancelled') \
             ORDER BY id",
        )
        .bind(cutoff)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(OutgoingTransfer::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(LibrarianError::Other)
    }

    /// Incoming transfers started before `cutoff` that are still non-terminal.
    pub async fn list_stale_incoming_transfers(
        &self,
        cutoff: chrono::DateTime<Utc>,
    ) -> Result<Vec<IncomingTransfer>> {
        let rows = sqlx::query_as::<_, IncomingTransferRow>(
            "SELECT * FROM incoming_transfers \
             WHERE start_time < $1 AND status NOT IN ('completed', 'failed', 'cancelled') \
             ORDER BY id",
        )
        .bind(cutoff)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(IncomingTransfer::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(LibrarianError::Other)
    }

    pub async fn list_outgoing_transfers_by_status(
        &self,
        status: TransferStatus,
    ) -> Result<Vec<OutgoingTransfer>> {
        let rows = sqlx::query_as::<_, OutgoingTransferRow>(
            "SELECT * FROM outgoing_transfers WHERE status = $1 ORDER BY id",
        )
        .bind(status.to_string())
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(OutgoingTransfer::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(LibrarianError::Other)
    }

    pub async fn create_clone_transfer(
        &self,
        file_name: &str,
        source_store_id: i64,
        dest_store_id: i64,
    ) -> Result<CloneTransfer> {
        let row = sqlx::query_as::<_, CloneTransferRow>(
            "INSERT INTO clone_transfers (status, file_name, source_store_id, dest_store_id, start_time) \
             VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(TransferStatus::Initiated.to_string())
        .bind(file_name)
        .bind(source_store_id)
        .bind(dest_store_id)
        .bind(Utc::now())
        .fetch_one(self.pool())
        .await?;

        CloneTransfer::try_from(row).map_err(LibrarianError::Other)
    }

    pub async fn get_clone_transfer(&self, id: i64) -> Result<Option<CloneTransfer>> {
        let row = sqlx::query_as::<_, CloneTransferRow>("SELECT * FROM clone_transfers WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.map(CloneTransfer::try_from)
            .transpose()
            .map_err(LibrarianError::Other)
    }

    pub async fn set_clone_transfer_status(
        &self,
        id: i64,
        from: TransferStatus,
        to: TransferStatus,
    ) -> Result<()> {
        if !from.can_transition_to(to) {
            return Err(LibrarianError::IllegalTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let end_time = to.is_terminal().then(Utc::now);
        sqlx::query("UPDATE clone_transfers SET status = $2, end_time = COALESCE($3, end_time) WHERE id = $1")
            .bind(id)
            .bind(to.to_string())
            .bind(end_time)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn set_clone_transfer_staging(&self, id: i64, staging_path: &str) -> Result<()> {
        sqlx::query("UPDATE clone_transfers SET staging_path = $2 WHERE id = $1")
            .bind(id)
            .bind(staging_path)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn list_clone_transfers_by_status(
        &self,
        status: TransferStatus,
    ) -> Result<Vec<CloneTransfer>> {
        let rows = sqlx::query_as::<_, CloneTransferRow>(
            "SELECT * FROM clone_transfers WHERE status = $1 ORDER BY id",
        )
        .bind(status.to_string())
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(CloneTransfer::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(LibrarianError::Other)
    }
}
