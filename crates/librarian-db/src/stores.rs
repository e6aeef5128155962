//! CRUD for `stores` and `librarians`.

use chrono::{DateTime, Utc};
use librarian_core::error::{LibrarianError, Result};
use librarian_core::types::{Librarian, Store};

use crate::rows::{LibrarianRow, StoreRow};
use crate::Database;

impl Database {
    pub async fn create_store(
        &self,
        name: &str,
        store_type: &str,
        store_data: serde_json::Value,
        transfer_managers: &[String],
        async_transfer_managers: &[String],
        ingestable: bool,
        enabled: bool,
    ) -> Result<Store> {
        let row = sqlx::query_as::<_, StoreRow>(
            "INSERT INTO stores (name, store_type, store_data, transfer_managers, async_transfer_managers, ingestable, enabled) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
        )
        .bind(name)
        .bind(store_type)
        .bind(store_data)
        .bind(serde_json::to_value(transfer_managers).map_err(anyhow::Error::from)?)
        .bind(serde_json::to_value(async_transfer_managers).map_err(anyhow::Error::from)?)
        .bind(ingestable)
        .bind(enabled)
        .fetch_one(self.pool())
        .await?;

        Store::try_from(row).map_err(LibrarianError::Other)
    }

    pub async fn get_store(&self, id: i64) -> Result<Option<Store>> {
        let row = sqlx::query_as::<_, StoreRow>("SELECT * FROM stores WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.map(Store::try_from)
            .transpose()
            .map_err(LibrarianError::Other)
    }

    pub async fn get_store_by_name(&self, name: &str) -> Result<Option<Store>> {
        let row = sqlx::query_as::<_, StoreRow>("SELECT * FROM stores WHERE name = $1")
            .bind(name)
            .fetch_optional(self.pool())
            .await?;
        row.map(Store::try_from)
            .transpose()
            .map_err(LibrarianError::Other)
    }

    pub async fn list_stores(&self) -> Result<Vec<Store>> {
        let rows = sqlx::query_as::<_, StoreRow>("SELECT * FROM stores ORDER BY id")
            .fetch_all(self.pool())
            .await?;

        rows.into_iter()
            .map(Store::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(LibrarianError::Other)
    }

    pub async fn set_store_enabled(&self, id: i64, enabled: bool) -> Result<()> {
        sqlx::query("UPDATE stores SET enabled = $2 WHERE id = $1")
            .bind(id)
            .bind(enabled)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn create_librarian(
        &self,
        name: &str,
        url: &str,
        port: u16,
        authenticator: &str,
    ) -> Result<Librarian> {
        let row = sqlx::query_as::<_, LibrarianRow>(
            "INSERT INTO librarians (name, url, port, authenticator, transfers_enabled) \
             VALUES ($1, $2, $3, $4, TRUE) RETURNING *",
        )
        .bind(name)
        .bind(url)
        .bind(i32::from(port))
        .bind(authenticator)
        .fetch_one(self.pool())
        .await?;

        Librarian::try_from(row).map_err(LibrarianError::Other)
    }

    pub async fn get_librarian_by_name(&self, name: &str) -> Result<Option<Librarian>> {
        let row = sqlx::query_as::<_, LibrarianRow>("SELECT * FROM librarians WHERE name = $1")
            .bind(name)
            .fetch_optional(self.pool())
            .await?;
        row.map(Librarian::try_from)
            .transpose()
            .map_err(LibrarianError::Other)
    }

    pub async fn list_librarians(&self) -> Result<Vec<Librarian>> {
        let rows = sqlx::query_as::<_, LibrarianRow>("SELECT * FROM librarians ORDER BY id")
            .fetch_all(self.pool())
            .await?;

        rows.into_iter()
            .map(Librarian::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(LibrarianError::Other)
    }

    pub async fn touch_librarian_seen(&self, name: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE librarians SET last_seen = $2 WHERE name = $1")
            .bind(name)
            .bind(at)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn touch_librarian_heard(&self, name: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE librarians SET last_heard = $2 WHERE name = $1")
            .bind(name)
            .bind(at)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn set_librarian_transfers_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        sqlx::query("UPDATE librarians SET transfers_enabled = $2 WHERE name = $1")
            .bind(name)
            .bind(enabled)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn remove_librarian(&self, name: &str) -> Result<()> {
        sqlx::query("DELETE FROM librarians WHERE name = $1")
            .bind(name)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
