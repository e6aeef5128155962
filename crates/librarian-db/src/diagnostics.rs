//! CRUD for `errors` and `corrupt_files`.

use chrono::Utc;
use librarian_core::error::{LibrarianError, Result};
use librarian_core::types::{Checksum, CorruptFile, ErrorCategory, ErrorRecord, ErrorSeverity};

use crate::rows::{self, CorruptFileRow, ErrorRow};
use crate::Database;

impl Database {
    pub async fn raise_error(
        &self,
        severity: ErrorSeverity,
        category: ErrorCategory,
        message: &str,
    ) -> Result<ErrorRecord> {
        let row = sqlx::query_as::<_, ErrorRow>(
            "INSERT INTO errors (severity, category, message, raised_time, cleared) \
             VALUES ($1, $2, $3, $4, FALSE) RETURNING *",
        )
        .bind(rows::severity_as_str(severity))
        .bind(rows::category_as_str(category))
        .bind(message)
        .bind(Utc::now())
        .fetch_one(self.pool())
        .await?;

        ErrorRecord::try_from(row).map_err(LibrarianError::Other)
    }

    pub async fn clear_error(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE errors SET cleared = TRUE, cleared_time = $2 WHERE id = $1")
            .bind(id)
            .bind(Utc::now())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn list_uncleared_errors(&self) -> Result<Vec<ErrorRecord>> {
        let rows = sqlx::query_as::<_, ErrorRow>(
            "SELECT * FROM errors WHERE cleared = FALSE ORDER BY raised_time DESC",
        )
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(ErrorRecord::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(LibrarianError::Other)
    }

    /// Record (or re-record) an Instance as corrupt. Repeat detections for the
    /// same `(file_name, instance_id)` increment `count` instead of creating
    /// a second row.
    pub async fn record_corrupt_file(
        &self,
        file_name: &str,
        instance_id: i64,
        size: i64,
        checksum: &Checksum,
    ) -> Result<CorruptFile> {
        let row = sqlx::query_as::<_, CorruptFileRow>(
            "INSERT INTO corrupt_files (file_name, instance_id, size, checksum, count, corrupt_time) \
             VALUES ($1, $2, $3, $4, 1, $5) \
             ON CONFLICT (file_name, instance_id) DO UPDATE \
             SET count = corrupt_files.count + 1, size = EXCLUDED.size, \
                 checksum = EXCLUDED.checksum, corrupt_time = EXCLUDED.corrupt_time \
             RETURNING *",
        )
        .bind(file_name)
        .bind(instance_id)
        .bind(size)
        .bind(checksum.to_string())
        .bind(Utc::now())
        .fetch_one(self.pool())
        .await?;

        CorruptFile::try_from(row).map_err(LibrarianError::Other)
    }

    pub async fn list_corrupt_files(&self) -> Result<Vec<CorruptFile>> {
        let rows = sqlx::query_as::<_, CorruptFileRow>(
            "SELECT * FROM corrupt_files ORDER BY corrupt_time DESC",
        )
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(CorruptFile::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(LibrarianError::Other)
    }
}
