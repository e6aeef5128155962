//! CRUD for `users` and `api_keys`.

use chrono::Utc;
use librarian_core::error::{LibrarianError, Result};
use librarian_core::types::{ApiKey, User, UserRole};
use uuid::Uuid;

use crate::rows::{self, ApiKeyRow, UserRow};
use crate::Database;

impl Database {
    pub async fn create_user(&self, username: &str, role: UserRole) -> Result<User> {
        let row = sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (id, username, role, created_at) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(rows::role_as_str(role))
        .bind(Utc::now())
        .fetch_one(self.pool())
        .await?;

        User::try_from(row).map_err(LibrarianError::Other)
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(self.pool())
            .await?;
        row.map(User::try_from)
            .transpose()
            .map_err(LibrarianError::Other)
    }

    pub async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.map(User::try_from)
            .transpose()
            .map_err(LibrarianError::Other)
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>("SELECT * FROM users ORDER BY created_at DESC")
            .fetch_all(self.pool())
            .await?;

        rows.into_iter()
            .map(User::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(LibrarianError::Other)
    }

    /// `key_hash` is the hex-encoded SHA-256 digest of the bearer key; the
    /// plaintext key is never persisted.
    pub async fn create_api_key(&self, user_id: Uuid, name: &str, key_hash: &str) -> Result<ApiKey> {
        let row = sqlx::query_as::<_, ApiKeyRow>(
            "INSERT INTO api_keys (id, user_id, name, key_hash, created_at) \
             VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(name)
        .bind(key_hash)
        .bind(Utc::now())
        .fetch_one(self.pool())
        .await?;

        Ok(ApiKey::from(row))
    }

    pub async fn validate_api_key(&self, key_hash: &str) -> Result<Option<(User, ApiKey)>> {
        let key_row = sqlx::query_as::<_, ApiKeyRow>("SELECT * FROM api_keys WHERE key_hash = $1")
            .bind(key_hash)
            .fetch_optional(self.pool())
            .await?;

        let Some(key_row) = key_row else {
            return Ok(None);
        };

        let user_row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(key_row.user_id)
            .fetch_optional(self.pool())
            .await?;

        let Some(user_row) = user_row else {
            return Ok(None);
        };

        let user = User::try_from(user_row).map_err(LibrarianError::Other)?;
        let api_key = ApiKey::from(key_row);
        Ok(Some((user, api_key)))
    }

    pub async fn touch_api_key_last_used(&self, key_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = $2 WHERE id = $1")
            .bind(key_id)
            .bind(Utc::now())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn list_user_api_keys(&self, user_id: Uuid) -> Result<Vec<ApiKey>> {
        let rows = sqlx::query_as::<_, ApiKeyRow>(
            "SELECT * FROM api_keys WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(ApiKey::from).collect())
    }

    pub async fn revoke_api_key(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM api_keys WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
