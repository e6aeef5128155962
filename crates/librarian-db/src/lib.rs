//! Postgres-backed repository for the librarian metadata database.
//!
//! Grounded directly on `snow-owl-db/src/lib.rs`: a `Database` struct
//! wrapping a `PgPool`, an inline `run_migrations` bootstrap using
//! `CREATE TABLE IF NOT EXISTS`, and per-entity CRUD methods that go through
//! `#[derive(sqlx::FromRow)]` row structs converted via `TryFrom` (see
//! `rows.rs`) for columns that carry an enum or JSON payload as `TEXT`.

mod auth;
mod diagnostics;
mod files;
mod rows;
mod sendqueue;
mod stores;
mod transfers;

use librarian_core::error::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};

pub use rows::*;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                name TEXT PRIMARY KEY,
                size BIGINT NOT NULL,
                checksum TEXT NOT NULL,
                uploader TEXT NOT NULL,
                source TEXT NOT NULL,
                create_time TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stores (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                store_type TEXT NOT NULL,
                store_data JSONB NOT NULL DEFAULT '{}',
                transfer_managers JSONB NOT NULL DEFAULT '[]',
                async_transfer_managers JSONB NOT NULL DEFAULT '[]',
                ingestable BOOLEAN NOT NULL DEFAULT FALSE,
                enabled BOOLEAN NOT NULL DEFAULT TRUE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS instances (
                id BIGSERIAL PRIMARY KEY,
                file_name TEXT NOT NULL REFERENCES files(name),
                store_id BIGINT NOT NULL REFERENCES stores(id),
                path TEXT NOT NULL,
                deletion_policy TEXT NOT NULL,
                created_time TIMESTAMPTZ NOT NULL,
                available BOOLEAN NOT NULL DEFAULT TRUE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS librarians (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                url TEXT NOT NULL,
                port INTEGER NOT NULL,
                authenticator TEXT NOT NULL,
                last_seen TIMESTAMPTZ,
                last_heard TIMESTAMPTZ,
                transfers_enabled BOOLEAN NOT NULL DEFAULT TRUE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS remote_instances (
                id BIGSERIAL PRIMARY KEY,
                file_name TEXT NOT NULL REFERENCES files(name),
                librarian_name TEXT NOT NULL REFERENCES librarians(name),
                remote_store_id BIGINT NOT NULL,
                copy_time TIMESTAMPTZ NOT NULL,
                sender TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS incoming_transfers (
                id BIGSERIAL PRIMARY KEY,
                status TEXT NOT NULL,
                source TEXT NOT NULL,
                uploader TEXT NOT NULL,
                upload_name TEXT NOT NULL,
                source_transfer_id BIGINT,
                store_id BIGINT REFERENCES stores(id),
                staging_path TEXT,
                store_path TEXT,
                transfer_size BIGINT NOT NULL,
                transfer_checksum TEXT NOT NULL,
                transfer_manager_name TEXT,
                start_time TIMESTAMPTZ NOT NULL,
                end_time TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS outgoing_transfers (
                id BIGSERIAL PRIMARY KEY,
                status TEXT NOT NULL,
                file_name TEXT NOT NULL REFERENCES files(name),
                destination TEXT NOT NULL,
                remote_transfer_id BIGINT,
                instance_id BIGINT REFERENCES instances(id),
                source_path TEXT,
                dest_path TEXT,
                transfer_size BIGINT NOT NULL,
                transfer_checksum TEXT NOT NULL,
                start_time TIMESTAMPTZ NOT NULL,
                end_time TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS clone_transfers (
                id BIGSERIAL PRIMARY KEY,
                status TEXT NOT NULL,
                file_name TEXT NOT NULL REFERENCES files(name),
                source_store_id BIGINT NOT NULL REFERENCES stores(id),
                dest_store_id BIGINT NOT NULL REFERENCES stores(id),
                staging_path TEXT,
                start_time TIMESTAMPTZ NOT NULL,
                end_time TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS send_queue (
                id BIGSERIAL PRIMARY KEY,
                priority INTEGER NOT NULL DEFAULT 0,
                destination TEXT NOT NULL,
                created_time TIMESTAMPTZ NOT NULL,
                retries INTEGER NOT NULL DEFAULT 0,
                async_transfer_manager JSONB NOT NULL,
                transfer_ids JSONB NOT NULL DEFAULT '[]',
                consumed BOOLEAN NOT NULL DEFAULT FALSE,
                consumed_time TIMESTAMPTZ,
                completed BOOLEAN NOT NULL DEFAULT FALSE,
                completed_time TIMESTAMPTZ,
                failed BOOLEAN NOT NULL DEFAULT FALSE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS errors (
                id BIGSERIAL PRIMARY KEY,
                severity TEXT NOT NULL,
                category TEXT NOT NULL,
                message TEXT NOT NULL,
                raised_time TIMESTAMPTZ NOT NULL,
                cleared_time TIMESTAMPTZ,
                cleared BOOLEAN NOT NULL DEFAULT FALSE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS corrupt_files (
                id BIGSERIAL PRIMARY KEY,
                file_name TEXT NOT NULL REFERENCES files(name),
                instance_id BIGINT NOT NULL REFERENCES instances(id),
                size BIGINT NOT NULL,
                checksum TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 1,
                corrupt_time TIMESTAMPTZ NOT NULL,
                UNIQUE (file_name, instance_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                role TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS api_keys (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                key_hash TEXT NOT NULL UNIQUE,
                created_at TIMESTAMPTZ NOT NULL,
                last_used_at TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
