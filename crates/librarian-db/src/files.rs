//! CRUD for `files`, `instances` and `remote_instances`.

use chrono::Utc;
use librarian_core::error::{LibrarianError, Result};
use librarian_core::types::{DeletionPolicy, File, Instance, RemoteInstance, TransferStatus};

use crate::rows::{FileRow, InstanceRow, RemoteInstanceRow};
use crate::Database;

impl Database {
    pub async fn create_file(&self, file: &File) -> Result<()> {
        sqlx::query(
            "INSERT INTO files (name, size, checksum, uploader, source, create_time) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&file.name)
        .bind(file.size)
        .bind(file.checksum.to_string())
        .bind(&file.uploader)
        .bind(&file.source)
        .bind(file.create_time)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_file(&self, name: &str) -> Result<Option<File>> {
        let row = sqlx::query_as::<_, FileRow>("SELECT * FROM files WHERE name = $1")
            .bind(name)
            .fetch_optional(self.pool())
            .await?;
        row.map(File::try_from)
            .transpose()
            .map_err(|e| LibrarianError::Other(e))
    }

    /// `search/file`'s full filter set (`SPEC_FULL.md` §6): every `Some`
    /// filter narrows the result, `name` matches by substring, and results
    /// come back newest-first.
    #[allow(clippy::too_many_arguments)]
    pub async fn search_files_advanced(
        &self,
        name: Option<&str>,
        create_time_window: Option<(chrono::DateTime<Utc>, chrono::DateTime<Utc>)>,
        uploader: Option<&str>,
        source: Option<&str>,
        limit: i64,
    ) -> Result<Vec<File>> {
        let rows = sqlx::query_as::<_, FileRow>(
            "SELECT * FROM files \
             WHERE ($1::TEXT IS NULL OR name ILIKE '%' || $1 || '%') \
             AND ($2::TIMESTAMPTZ IS NULL OR create_time >= $2) \
             AND ($3::TIMESTAMPTZ IS NULL OR create_time <= $3) \
             AND ($4::TEXT IS NULL OR uploader = $4) \
             AND ($5::TEXT IS NULL OR source = $5) \
             ORDER BY create_time DESC LIMIT $6",
        )
        .bind(name)
        .bind(create_time_window.map(|w| w.0))
        .bind(create_time_window.map(|w| w.1))
        .bind(uploader)
        .bind(source)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(File::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(LibrarianError::Other)
    }

    pub async fn create_instance(
        &self,
        file_name: &str,
        store_id: i64,
        path: &str,
        deletion_policy: DeletionPolicy,
    ) -> Result<Instance> {
        let row = sqlx::query_as::<_, InstanceRow>(
            "INSERT INTO instances (file_name, store_id, path, deletion_policy, created_time, available) \
             VALUES ($1, $2, $3, $4, $5, TRUE) RETURNING *",
        )
        .bind(file_name)
        .bind(store_id)
        .bind(path)
        .bind(deletion_policy.to_string())
        .bind(Utc::now())
        .fetch_one(self.pool())
        .await?;

        Instance::try_from(row).map_err(LibrarianError::Other)
    }

    /// Create the `File` row (if none exists yet), the `Instance` row, and
    /// advance the incoming transfer to `to`, all in one transaction
    /// (`SPEC_FULL.md` §9): a DB error partway through must roll every part
    /// back rather than leave a `File` with no `Instance`.
    pub async fn complete_ingest(
        &self,
        file: &File,
        store_id: i64,
        path: &str,
        deletion_policy: DeletionPolicy,
        incoming_transfer_id: i64,
        from: TransferStatus,
        to: TransferStatus,
    ) -> Result<Instance> {
        if !from.can_transition_to(to) {
            return Err(LibrarianError::IllegalTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let mut tx = self.pool().begin().await?;

        let existing = sqlx::query_as::<_, FileRow>("SELECT * FROM files WHERE name = $1")
            .bind(&file.name)
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_none() {
            sqlx::query(
                "INSERT INTO files (name, size, checksum, uploader, source, create_time) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(&file.name)
            .bind(file.size)
            .bind(file.checksum.to_string())
            .bind(&file.uploader)
            .bind(&file.source)
            .bind(file.create_time)
            .execute(&mut *tx)
            .await?;
        }

        let instance_row = sqlx::query_as::<_, InstanceRow>(
            "INSERT INTO instances (file_name, store_id, path, deletion_policy, created_time, available) \
             VALUES ($1, $2, $3, $4, $5, TRUE) RETURNING *",
        )
        .bind(&file.name)
        .bind(store_id)
        .bind(path)
        .bind(deletion_policy.to_string())
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        let end_time = to.is_terminal().then(Utc::now);
        sqlx::query("UPDATE incoming_transfers SET status = $2, end_time = COALESCE($3, end_time) WHERE id = $1")
            .bind(incoming_transfer_id)
            .bind(to.to_string())
            .bind(end_time)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Instance::try_from(instance_row).map_err(LibrarianError::Other)
    }

    pub async fn get_instance(&self, id: i64) -> Result<Option<Instance>> {
        let row = sqlx::query_as::<_, InstanceRow>("SELECT * FROM instances WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.map(Instance::try_from)
            .transpose()
            .map_err(LibrarianError::Other)
    }

    pub async fn instances_for_file(&self, file_name: &str) -> Result<Vec<Instance>> {
        let rows = sqlx::query_as::<_, InstanceRow>(
            "SELECT * FROM instances WHERE file_name = $1 ORDER BY id",
        )
        .bind(file_name)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(Instance::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(LibrarianError::Other)
    }

    pub async fn instances_on_store(&self, store_id: i64) -> Result<Vec<Instance>> {
        let rows = sqlx::query_as::<_, InstanceRow>(
            "SELECT * FROM instances WHERE store_id = $1 ORDER BY id",
        )
        .bind(store_id)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(Instance::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(LibrarianError::Other)
    }

    pub async fn set_instance_available(&self, id: i64, available: bool) -> Result<()> {
        sqlx::query("UPDATE instances SET available = $2 WHERE id = $1")
            .bind(id)
            .bind(available)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn delete_instance(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM instances WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn create_remote_instance(
        &self,
        file_name: &str,
        librarian_name: &str,
        remote_store_id: i64,
        sender: &str,
    ) -> Result<RemoteInstance> {
        let row = sqlx::query_as::<_, RemoteInstanceRow>(
            "INSERT INTO remote_instances (file_name, librarian_name, remote_store_id, copy_time, sender) \
             VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(file_name)
        .bind(librarian_name)
        .bind(remote_store_id)
        .bind(Utc::now())
        .bind(sender)
        .fetch_one(self.pool())
        .await?;

        Ok(RemoteInstance::from(row))
    }

    /// Dedup key per `(file, librarian, remote_store_id)`.
    pub async fn find_remote_instance(
        &self,
        file_name: &str,
        librarian_name: &str,
        remote_store_id: i64,
    ) -> Result<Option<RemoteInstance>> {
        let row = sqlx::query_as::<_, RemoteInstanceRow>(
            "SELECT * FROM remote_instances \
             WHERE file_name = $1 AND librarian_name = $2 AND remote_store_id = $3",
        )
        .bind(file_name)
        .bind(librarian_name)
        .bind(remote_store_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(RemoteInstance::from))
    }

    pub async fn remote_instances_for_file(&self, file_name: &str) -> Result<Vec<RemoteInstance>> {
        let rows = sqlx::query_as::<_, RemoteInstanceRow>(
            "SELECT * FROM remote_instances WHERE file_name = $1 ORDER BY id",
        )
        .bind(file_name)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(RemoteInstance::from).collect())
    }

    pub async fn count_remote_copies(&self, file_name: &str) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM remote_instances WHERE file_name = $1")
                .bind(file_name)
                .fetch_one(self.pool())
                .await?;
        Ok(count)
    }

    pub async fn has_remote_instance_at_librarian(
        &self,
        file_name: &str,
        librarian_name: &str,
    ) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM remote_instances WHERE file_name = $1 AND librarian_name = $2)",
        )
        .bind(file_name)
        .bind(librarian_name)
        .fetch_one(self.pool())
        .await?;
        Ok(exists)
    }

    /// Files created after `cutoff` that have at least one available
    /// Instance and no non-terminal `OutgoingTransfer` to `destination`.
    pub async fn files_eligible_for_send_clone(
        &self,
        cutoff: chrono::DateTime<Utc>,
        destination: &str,
        limit: i64,
    ) -> Result<Vec<File>> {
        let rows = sqlx::query_as::<_, FileRow>(
            "SELECT f.* FROM files f \
             WHERE f.create_time > $1 \
             AND EXISTS (SELECT 1 FROM instances i WHERE i.file_name = f.name AND i.available = TRUE) \
             AND NOT EXISTS ( \
                 SELECT 1 FROM remote_instances ri \
                 WHERE ri.file_name = f.name AND ri.librarian_name = $2 \
             ) \
             AND NOT EXISTS ( \
                 SELECT 1 FROM outgoing_transfers ot \
                 WHERE ot.file_name = f.name AND ot.destination = $2 \
                 AND ot.status NOT IN ('completed', 'failed', 'cancelled') \
             ) \
             ORDER BY f.create_time DESC LIMIT $3",
        )
        .bind(cutoff)
        .bind(destination)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(File::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(LibrarianError::Other)
    }

    /// Instances on `store_id` whose File was created after `cutoff`. The
    /// File itself is fetched separately by the caller via `get_file`, since
    /// only a handful of rows are expected per run.
    pub async fn instances_on_store_created_after(
        &self,
        store_id: i64,
        cutoff: chrono::DateTime<Utc>,
    ) -> Result<Vec<Instance>> {
        let rows = sqlx::query_as::<_, InstanceRow>(
            "SELECT i.* FROM instances i \
             JOIN files f ON f.name = i.file_name \
             WHERE i.store_id = $1 AND f.create_time > $2 \
             ORDER BY i.id",
        )
        .bind(store_id)
        .bind(cutoff)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(Instance::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(LibrarianError::Other)
    }

    /// Instances on `from_store_id` whose File has no Instance on any store
    /// in `to_store_ids`.
    pub async fn instances_missing_on_stores(
        &self,
        from_store_id: i64,
        to_store_ids: &[i64],
        limit: i64,
    ) -> Result<Vec<Instance>> {
        let rows = sqlx::query_as::<_, InstanceRow>(
            "SELECT i.* FROM instances i \
             WHERE i.store_id = $1 \
             AND NOT EXISTS ( \
                 SELECT 1 FROM instances other \
                 WHERE other.file_name = i.file_name AND other.store_id = ANY($2) \
             ) \
             ORDER BY i.id LIMIT $3",
        )
        .bind(from_store_id)
        .bind(to_store_ids)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(Instance::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(LibrarianError::Other)
    }

    /// Available instances on `store_id` created before `cutoff`, the
    /// candidate pool for rolling deletion.
    pub async fn available_instances_older_than(
        &self,
        store_id: i64,
        cutoff: chrono::DateTime<Utc>,
    ) -> Result<Vec<Instance>> {
        let rows = sqlx::query_as::<_, InstanceRow>(
            "SELECT * FROM instances \
             WHERE store_id = $1 AND available = TRUE AND created_time < $2 \
             ORDER BY id",
        )
        .bind(store_id)
        .bind(cutoff)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(Instance::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(LibrarianError::Other)
    }

    /// Delete every `remote_instances` row that duplicates an earlier one
    /// for the same `(file_name, librarian_name, remote_store_id)`, keeping
    /// the earliest `copy_time`. Returns the number of rows removed.
    pub async fn delete_duplicate_remote_instances(&self) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM remote_instances ri \
             USING remote_instances earlier \
             WHERE ri.file_name = earlier.file_name \
             AND ri.librarian_name = earlier.librarian_name \
             AND ri.remote_store_id = earlier.remote_store_id \
             AND (ri.copy_time, ri.id) > (earlier.copy_time, earlier.id)",
        )
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected())
    }
}
