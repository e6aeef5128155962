//! Wire models for the peer-to-peer librarian protocol (`SPEC_FULL.md` §6).
//!
//! Grounded on `original_source/hera_librarian/models/{ping,search,clone}.py`:
//! the original's pydantic request/response pairs translated into serde
//! structs with the same field names.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use librarian_core::types::{AsyncTransferManager, Checksum, TransferStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub reason: String,
    pub suggested_remedy: String,
    #[serde(default)]
    pub source_transfer_id: Option<i64>,
    #[serde(default)]
    pub destination_transfer_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PingRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResponse {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchFileRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub create_time_window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub max_results: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchFileInstance {
    pub id: i64,
    pub store: String,
    pub path: String,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchFileRemoteInstance {
    pub librarian: String,
    pub store_id: i64,
    pub copy_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchFileResponseItem {
    pub name: String,
    pub create_time: DateTime<Utc>,
    pub size: i64,
    pub checksum: Checksum,
    pub uploader: String,
    pub source: String,
    pub instances: Vec<SearchFileInstance>,
    pub remote_instances: Vec<SearchFileRemoteInstance>,
}

pub type SearchFileResponse = Vec<SearchFileResponseItem>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateFileRequest {
    pub file_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateFileResponseItem {
    pub librarian: String,
    pub store: String,
    pub instance_id: i64,
    pub original_checksum: Checksum,
    pub original_size: i64,
    pub current_checksum: Option<Checksum>,
    pub current_size: Option<i64>,
    pub computed_same_checksum: bool,
}

pub type ValidateFileResponse = Vec<ValidateFileResponseItem>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneStageRequest {
    pub upload_name: String,
    pub destination_location: String,
    pub upload_size: i64,
    pub upload_checksum: Checksum,
    pub source_transfer_id: i64,
    pub source_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneBatchStageRequest {
    pub uploads: Vec<CloneStageRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneStageResponseItem {
    pub staging_location: String,
    pub destination_transfer_id: i64,
    pub async_transfer_providers: HashMap<String, AsyncTransferManager>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneBatchStageResponse {
    pub uploads: HashMap<i64, CloneStageResponseItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneTransferIdPair {
    pub source_transfer_id: i64,
    pub destination_transfer_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CloneAckResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneCompleteRequest {
    pub source_transfer_id: i64,
    pub destination_transfer_id: i64,
    pub remote_store_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinStatusRequest {
    pub source_transfer_ids: Vec<i64>,
    pub destination_transfer_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinStatusResponse {
    pub source_transfer_status: HashMap<i64, Option<TransferStatus>>,
    pub destination_transfer_status: HashMap<i64, Option<TransferStatus>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinUpdateRequest {
    pub source_transfer_updates: HashMap<i64, TransferStatus>,
    pub destination_transfer_updates: HashMap<i64, TransferStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinUpdateResponse {
    pub modified_source_transfer_ids: Vec<i64>,
    pub modified_destination_transfer_ids: Vec<i64>,
    pub unmodified_source_transfer_ids: Vec<i64>,
    pub unmodified_destination_transfer_ids: Vec<i64>,
    pub reasons: HashMap<i64, String>,
}
