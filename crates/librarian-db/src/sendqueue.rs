//! CRUD and consumer reservation for the durable send queue.
//!
//! `reserve_next` and `reserve_next_completed_check` both use
//! `SELECT ... FOR UPDATE SKIP LOCKED` so that multiple background workers
//! (or multiple librarian processes sharing one database) can poll the same
//! table without racing each other onto the same row.

use chrono::Utc;
use librarian_core::error::{LibrarianError, Result};
use librarian_core::types::AsyncTransferManager;

use crate::rows::{SendQueueItemWithTransferIds, SendQueueRow};
use crate::Database;

impl Database {
    pub async fn create_send_queue_item(
        &self,
        priority: i32,
        destination: &str,
        async_transfer_manager: &AsyncTransferManager,
        transfer_ids: &[i64],
    ) -> Result<SendQueueItemWithTransferIds> {
        let row = sqlx::query_as::<_, SendQueueRow>(
            "INSERT INTO send_queue (priority, destination, created_time, async_transfer_manager, transfer_ids) \
             VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(priority)
        .bind(destination)
        .bind(Utc::now())
        .bind(serde_json::to_value(async_transfer_manager).map_err(anyhow::Error::from)?)
        .bind(serde_json::to_value(transfer_ids).map_err(anyhow::Error::from)?)
        .fetch_one(self.pool())
        .await?;

        SendQueueItemWithTransferIds::try_from(row).map_err(LibrarianError::Other)
    }

    pub async fn get_send_queue_item(&self, id: i64) -> Result<Option<SendQueueItemWithTransferIds>> {
        let row = sqlx::query_as::<_, SendQueueRow>("SELECT * FROM send_queue WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.map(SendQueueItemWithTransferIds::try_from)
            .transpose()
            .map_err(LibrarianError::Other)
    }

    /// Claim the highest-priority unconsumed row, skipping any row another
    /// worker already holds a lock on, and mark it consumed in the same
    /// transaction.
    pub async fn reserve_next(&self) -> Result<Option<SendQueueItemWithTransferIds>> {
        let mut tx = self.pool().begin().await?;

        let row = sqlx::query_as::<_, SendQueueRow>(
            "SELECT * FROM send_queue \
             WHERE consumed = FALSE AND failed = FALSE \
             ORDER BY priority DESC, created_time ASC \
             FOR UPDATE SKIP LOCKED LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        sqlx::query("UPDATE send_queue SET consumed = TRUE, consumed_time = $2 WHERE id = $1")
            .bind(row.id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        SendQueueItemWithTransferIds::try_from(row).map_err(LibrarianError::Other)
    }

    /// Claim a consumed-but-not-yet-completed row for the completion checker,
    /// skipping rows another worker is currently polling.
    pub async fn reserve_next_completed_check(&self) -> Result<Option<SendQueueItemWithTransferIds>> {
        let mut tx = self.pool().begin().await?;

        let row = sqlx::query_as::<_, SendQueueRow>(
            "SELECT * FROM send_queue \
             WHERE consumed = TRUE AND completed = FALSE AND failed = FALSE \
             ORDER BY created_time ASC \
             FOR UPDATE SKIP LOCKED LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;

        row.map(SendQueueItemWithTransferIds::try_from)
            .transpose()
            .map_err(LibrarianError::Other)
    }

    pub async fn update_send_queue_manager(
        &self,
        id: i64,
        async_transfer_manager: &AsyncTransferManager,
    ) -> Result<()> {
        sqlx::query("UPDATE send_queue SET async_transfer_manager = $2 WHERE id = $1")
            .bind(id)
            .bind(serde_json::to_value(async_transfer_manager).map_err(anyhow::Error::from)?)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn mark_send_queue_completed(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE send_queue SET completed = TRUE, completed_time = $2 WHERE id = $1")
            .bind(id)
            .bind(Utc::now())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn mark_send_queue_failed(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE send_queue SET failed = TRUE, completed = TRUE, completed_time = $2 WHERE id = $1")
            .bind(id)
            .bind(Utc::now())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn increment_send_queue_retries(&self, id: i64) -> Result<i32> {
        let retries: i32 = sqlx::query_scalar(
            "UPDATE send_queue SET retries = retries + 1 WHERE id = $1 RETURNING retries",
        )
        .bind(id)
        .fetch_one(self.pool())
        .await?;
        Ok(retries)
    }

    pub async fn requeue_send_queue_item(&self, id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE send_queue SET consumed = FALSE, consumed_time = NULL WHERE id = $1",
        )
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
