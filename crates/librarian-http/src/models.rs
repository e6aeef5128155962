//! Wire models for the endpoints only a direct client (not a peer) calls.
//! The peer protocol's models (`search/file`, `validate/file`, `clone/*`,
//! `checkin/*`, `ping`) are reused from `librarian_client::models` verbatim,
//! since the client crate already defines exactly the shapes this server
//! must accept and emit (`SPEC_FULL.md` §6).
//!
//! Each type derives both `Serialize` and `Deserialize` even though any one
//! binary only uses one direction: the server deserializes requests and
//! serializes responses, while `librarian`'s own `file upload`/`file search`
//! commands do the opposite against the same wire shapes.

use std::collections::HashMap;

use librarian_core::types::{AsyncTransferManager, Checksum};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadStageRequest {
    pub destination_location: String,
    pub upload_size: i64,
    pub upload_checksum: Checksum,
    pub uploader: String,
    pub upload_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadStageResponse {
    pub store_name: String,
    pub staging_name: String,
    pub staging_location: String,
    pub upload_name: String,
    pub destination_location: String,
    pub transfer_providers: HashMap<String, AsyncTransferManager>,
    pub transfer_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadCommitRequest {
    pub transfer_id: i64,
    pub transfer_provider: String,
}
