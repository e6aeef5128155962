//! Store manager contract and the local-filesystem reference implementation.
//!
//! Grounded on `original_source/librarian_server/stores/core.py`'s `CoreStore`
//! abstract base class, translated into a Rust trait (`SPEC_FULL.md` §4.2).

mod local;

pub use local::LocalStore;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use librarian_core::error::Result;
use librarian_core::types::ChecksumAlgorithm;

/// Information about a file or directory at a path on a store.
#[derive(Debug, Clone)]
pub struct PathInfo {
    pub size: i64,
    pub checksum: librarian_core::types::Checksum,
    pub is_dir: bool,
}

/// Store manager contract (`SPEC_FULL.md` §4.2). The local kind below is the
/// only implementation shipped; `store_type` on the `Store` row is carried
/// as data so a future deployment could add another kind without changing
/// this trait.
#[async_trait]
pub trait StoreManager: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the store backend itself is reachable/writable right now.
    fn available(&self) -> bool;

    /// Bytes free on the underlying storage.
    fn free_space(&self) -> Result<i64>;

    /// Allocate a fresh staging subdirectory for a file of `file_size` bytes.
    /// Returns `(relative_staging_name, absolute_staging_path)`.
    async fn stage(&self, file_size: i64, file_name: &str) -> Result<(PathBuf, PathBuf)>;

    /// Remove a staging subdirectory recursively, if present. Idempotent.
    async fn unstage(&self, staging_path: &Path) -> Result<()>;

    /// Atomically move bytes from staging into their final location.
    async fn commit(&self, staging_path: &Path, store_path: &Path) -> Result<()>;

    /// Reserve a namespace slot under the store root for `relative_name`.
    /// Fails if the path already exists.
    fn reserve(&self, relative_name: &str) -> Result<PathBuf>;

    /// Inspect a path already inside the store, computing its checksum with
    /// `hash_algorithm`.
    async fn path_info(&self, path: &Path, hash_algorithm: ChecksumAlgorithm) -> Result<PathInfo>;

    /// Resolve a caller-supplied relative path against the staging root,
    /// rejecting paths that would escape it.
    fn resolve_path_staging(&self, relative: &Path) -> Result<PathBuf>;

    /// Resolve a caller-supplied relative path against the store root,
    /// rejecting paths that would escape it.
    fn resolve_path_store(&self, relative: &Path) -> Result<PathBuf>;

    /// Delete a path from the store outright (used by `RollingDeletion`'s
    /// `force_deletion` path).
    async fn delete(&self, path: &Path) -> Result<()>;
}
