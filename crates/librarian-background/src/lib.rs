//! Background scheduler, send-queue workers and periodic maintenance tasks.
//!
//! Grounded on `original_source/librarian_background/*.py`: a cooperative
//! scheduler running pure `Task` objects at a configured period, each
//! checking a soft timeout rather than overrunning its tick.

pub mod queues;
pub mod scheduler;
pub mod task;
pub mod tasks;
pub mod transfer_manager;
pub mod worker_pool;

use std::collections::HashMap;
use std::sync::Arc;

use librarian_client::{split_authenticator, LibrarianClient};
use librarian_core::encryption::decrypt_authenticator;
use librarian_core::error::{LibrarianError, Result};
use librarian_core::types::Librarian;
use librarian_core::Config;
use librarian_db::Database;
use librarian_store::StoreManager;

pub use task::Task;

/// Shared state handed to every task invocation. Tasks open and close their
/// own database calls within a single `run`; none hold state across ticks.
pub struct TaskContext {
    pub db: Database,
    pub stores: HashMap<String, Arc<dyn StoreManager>>,
    pub config: Config,
}

impl TaskContext {
    pub fn new(db: Database, stores: HashMap<String, Arc<dyn StoreManager>>, config: Config) -> Self {
        Self { db, stores, config }
    }

    pub fn store(&self, name: &str) -> Result<Arc<dyn StoreManager>> {
        self.stores
            .get(name)
            .cloned()
            .ok_or_else(|| LibrarianError::Configuration(format!("unknown store: {name}")))
    }

    /// Build a client for `librarian`, decrypting its stored authenticator
    /// with this server's own encryption key.
    pub fn client_for(&self, librarian: &Librarian) -> Result<LibrarianClient> {
        let plaintext = decrypt_authenticator(
            &librarian.authenticator,
            &self.config.authenticator_encryption_key,
        )?;
        let (user, password) = split_authenticator(&plaintext)?;
        Ok(LibrarianClient::new(
            &librarian.url,
            librarian.port,
            user,
            password,
        ))
    }
}
