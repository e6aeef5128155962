use chrono::{DateTime, Utc};
use librarian_core::types::{
    AsyncTransferManager, CloneTransfer, CorruptFile, DeletionPolicy, ErrorCategory, ErrorRecord,
    ErrorSeverity, File, IncomingTransfer, Instance, Librarian, OutgoingTransfer, RemoteInstance,
    Store, TransferStatus,
};
use uuid::Uuid;

#[derive(sqlx::FromRow)]
pub(crate) struct FileRow {
    pub name: String,
    pub size: i64,
    pub checksum: String,
    pub uploader: String,
    pub source: String,
    pub create_time: DateTime<Utc>,
}

impl TryFrom<FileRow> for File {
    type Error = anyhow::Error;

    fn try_from(row: FileRow) -> Result<Self, Self::Error> {
        Ok(File {
            name: row.name,
            size: row.size,
            checksum: row.checksum.parse()?,
            uploader: row.uploader,
            source: row.source,
            create_time: row.create_time,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct InstanceRow {
    pub id: i64,
    pub file_name: String,
    pub store_id: i64,
    pub path: String,
    pub deletion_policy: String,
    pub created_time: DateTime<Utc>,
    pub available: bool,
}

impl TryFrom<InstanceRow> for Instance {
    type Error = anyhow::Error;

    fn try_from(row: InstanceRow) -> Result<Self, Self::Error> {
        Ok(Instance {
            id: row.id,
            file_name: row.file_name,
            store_id: row.store_id,
            path: row.path,
            deletion_policy: row.deletion_policy.parse::<DeletionPolicy>()?,
            created_time: row.created_time,
            available: row.available,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct RemoteInstanceRow {
    pub id: i64,
    pub file_name: String,
    pub librarian_name: String,
    pub remote_store_id: i64,
    pub copy_time: DateTime<Utc>,
    pub sender: String,
}

impl From<RemoteInstanceRow> for RemoteInstance {
    fn from(row: RemoteInstanceRow) -> Self {
        RemoteInstance {
            id: row.id,
            file_name: row.file_name,
            librarian_name: row.librarian_name,
            remote_store_id: row.remote_store_id,
            copy_time: row.copy_time,
            sender: row.sender,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct StoreRow {
    pub id: i64,
    pub name: String,
    pub store_type: String,
    pub store_data: serde_json::Value,
    pub transfer_managers: serde_json::Value,
    pub async_transfer_managers: serde_json::Value,
    pub ingestable: bool,
    pub enabled: bool,
}

impl TryFrom<StoreRow> for Store {
    type Error = anyhow::Error;

    fn try_from(row: StoreRow) -> Result<Self, Self::Error> {
        Ok(Store {
            id: row.id,
            name: row.name,
            store_type: row.store_type,
            store_data: row.store_data,
            transfer_managers: serde_json::from_value(row.transfer_managers)?,
            async_transfer_managers: serde_json::from_value(row.async_transfer_managers)?,
            ingestable: row.ingestable,
            enabled: row.enabled,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct LibrarianRow {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub port: i32,
    pub authenticator: String,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_heard: Option<DateTime<Utc>>,
    pub transfers_enabled: bool,
}

impl TryFrom<LibrarianRow> for Librarian {
    type Error = anyhow::Error;

    fn try_from(row: LibrarianRow) -> Result<Self, Self::Error> {
        Ok(Librarian {
            id: row.id,
            name: row.name,
            url: row.url,
            port: u16::try_from(row.port)?,
            authenticator: row.authenticator,
            last_seen: row.last_seen,
            last_heard: row.last_heard,
            transfers_enabled: row.transfers_enabled,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct IncomingTransferRow {
    pub id: i64,
    pub status: String,
    pub source: String,
    pub uploader: String,
    pub upload_name: String,
    pub source_transfer_id: Option<i64>,
    pub store_id: Option<i64>,
    pub staging_path: Option<String>,
    pub store_path: Option<String>,
    pub transfer_size: i64,
    pub transfer_checksum: String,
    pub transfer_manager_name: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl TryFrom<IncomingTransferRow> for IncomingTransfer {
    type Error = anyhow::Error;

    fn try_from(row: IncomingTransferRow) -> Result<Self, Self::Error> {
        Ok(IncomingTransfer {
            id: row.id,
            status: row.status.parse::<TransferStatus>()?,
            source: row.source,
            uploader: row.uploader,
            upload_name: row.upload_name,
            source_transfer_id: row.source_transfer_id,
            store_id: row.store_id,
            staging_path: row.staging_path,
            store_path: row.store_path,
            transfer_size: row.transfer_size,
            transfer_checksum: row.transfer_checksum.parse()?,
            transfer_manager_name: row.transfer_manager_name,
            start_time: row.start_time,
            end_time: row.end_time,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct OutgoingTransferRow {
    pub id: i64,
    pub status: String,
    pub file_name: String,
    pub destination: String,
    pub remote_transfer_id: Option<i64>,
    pub instance_id: Option<i64>,
    pub source_path: Option<String>,
    pub dest_path: Option<String>,
    pub transfer_size: i64,
    pub transfer_checksum: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl TryFrom<OutgoingTransferRow> for OutgoingTransfer {
    type Error = anyhow::Error;

    fn try_from(row: OutgoingTransferRow) -> Result<Self, Self::Error> {
        Ok(OutgoingTransfer {
            id: row.id,
            status: row.status.parse::<TransferStatus>()?,
            file_name: row.file_name,
            destination: row.destination,
            remote_transfer_id: row.remote_transfer_id,
            instance_id: row.instance_id,
            source_path: row.source_path,
            dest_path: row.dest_path,
            transfer_size: row.transfer_size,
            transfer_checksum: row.transfer_checksum.parse()?,
            start_time: row.start_time,
            end_time: row.end_time,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct CloneTransferRow {
    pub id: i64,
    pub status: String,
    pub file_name: String,
    pub source_store_id: i64,
    pub dest_store_id: i64,
    pub staging_path: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl TryFrom<CloneTransferRow> for CloneTransfer {
    type Error = anyhow::Error;

    fn try_from(row: CloneTransferRow) -> Result<Self, Self::Error> {
        Ok(CloneTransfer {
            id: row.id,
            status: row.status.parse::<TransferStatus>()?,
            file_name: row.file_name,
            source_store_id: row.source_store_id,
            dest_store_id: row.dest_store_id,
            staging_path: row.staging_path,
            start_time: row.start_time,
            end_time: row.end_time,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct SendQueueRow {
    pub id: i64,
    pub priority: i32,
    pub destination: String,
    pub created_time: DateTime<Utc>,
    pub retries: i32,
    pub async_transfer_manager: serde_json::Value,
    pub transfer_ids: serde_json::Value,
    pub consumed: bool,
    pub consumed_time: Option<DateTime<Utc>>,
    pub completed: bool,
    pub completed_time: Option<DateTime<Utc>>,
    pub failed: bool,
}

pub struct SendQueueItemWithTransferIds {
    pub id: i64,
    pub priority: i32,
    pub destination: String,
    pub created_time: DateTime<Utc>,
    pub retries: i32,
    pub async_transfer_manager: AsyncTransferManager,
    pub transfer_ids: Vec<i64>,
    pub consumed: bool,
    pub consumed_time: Option<DateTime<Utc>>,
    pub completed: bool,
    pub completed_time: Option<DateTime<Utc>>,
    pub failed: bool,
}

impl TryFrom<SendQueueRow> for SendQueueItemWithTransferIds {
    type Error = anyhow::Error;

    fn try_from(row: SendQueueRow) -> Result<Self, Self::Error> {
        Ok(SendQueueItemWithTransferIds {
            id: row.id,
            priority: row.priority,
            destination: row.destination,
            created_time: row.created_time,
            retries: row.retries,
            async_transfer_manager: serde_json::from_value(row.async_transfer_manager)?,
            transfer_ids: serde_json::from_value(row.transfer_ids)?,
            consumed: row.consumed,
            consumed_time: row.consumed_time,
            completed: row.completed,
            completed_time: row.completed_time,
            failed: row.failed,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ErrorRow {
    pub id: i64,
    pub severity: String,
    pub category: String,
    pub message: String,
    pub raised_time: DateTime<Utc>,
    pub cleared_time: Option<DateTime<Utc>>,
    pub cleared: bool,
}

impl TryFrom<ErrorRow> for ErrorRecord {
    type Error = anyhow::Error;

    fn try_from(row: ErrorRow) -> Result<Self, Self::Error> {
        let severity = match row.severity.as_str() {
            "info" => ErrorSeverity::Info,
            "warning" => ErrorSeverity::Warning,
            "error" => ErrorSeverity::Error,
            "critical" => ErrorSeverity::Critical,
            other => anyhow::bail!("unknown error severity: {other}"),
        };
        let category = match row.category.as_str() {
            "data_integrity" => ErrorCategory::DataIntegrity,
            "data_availability" => ErrorCategory::DataAvailability,
            "configuration" => ErrorCategory::Configuration,
            "store_full" => ErrorCategory::StoreFull,
            "programming" => ErrorCategory::Programming,
            "librarian_network_availability" => ErrorCategory::LibrarianNetworkAvailability,
            "transfer" => ErrorCategory::Transfer,
            other => anyhow::bail!("unknown error category: {other}"),
        };

        Ok(ErrorRecord {
            id: row.id,
            severity,
            category,
            message: row.message,
            raised_time: row.raised_time,
            cleared_time: row.cleared_time,
            cleared: row.cleared,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct CorruptFileRow {
    pub id: i64,
    pub file_name: String,
    pub instance_id: i64,
    pub size: i64,
    pub checksum: String,
    pub count: i32,
    pub corrupt_time: DateTime<Utc>,
}

impl TryFrom<CorruptFileRow> for CorruptFile {
    type Error = anyhow::Error;

    fn try_from(row: CorruptFileRow) -> Result<Self, Self::Error> {
        Ok(CorruptFile {
            id: row.id,
            file_name: row.file_name,
            instance_id: row.instance_id,
            size: row.size,
            checksum: row.checksum.parse()?,
            count: row.count,
            corrupt_time: row.corrupt_time,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for librarian_core::types::User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = match row.role.as_str() {
            "admin" => librarian_core::types::UserRole::Admin,
            "read_append" => librarian_core::types::UserRole::ReadAppend,
            "callback" => librarian_core::types::UserRole::Callback,
            "read_only" => librarian_core::types::UserRole::ReadOnly,
            other => anyhow::bail!("unknown user role: {other}"),
        };

        Ok(librarian_core::types::User {
            id: row.id,
            username: row.username,
            role,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ApiKeyRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub key_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl From<ApiKeyRow> for librarian_core::types::ApiKey {
    fn from(row: ApiKeyRow) -> Self {
        librarian_core::types::ApiKey {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            key_hash: row.key_hash,
            created_at: row.created_at,
            last_used_at: row.last_used_at,
        }
    }
}

pub(crate) fn role_as_str(role: librarian_core::types::UserRole) -> &'static str {
    use librarian_core::types::UserRole::*;
    match role {
        Admin => "admin",
        ReadAppend => "read_append",
        Callback => "callback",
        ReadOnly => "read_only",
    }
}

pub(crate) fn severity_as_str(severity: ErrorSeverity) -> &'static str {
    match severity {
        ErrorSeverity::Info => "info",
        ErrorSeverity::Warning => "warning",
        ErrorSeverity::Error => "error",
        ErrorSeverity::Critical => "critical",
    }
}

pub(crate) fn category_as_str(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::DataIntegrity => "data_integrity",
        ErrorCategory::DataAvailability => "data_availability",
        ErrorCategory::Configuration => "configuration",
        ErrorCategory::StoreFull => "store_full",
        ErrorCategory::Programming => "programming",
        ErrorCategory::LibrarianNetworkAvailability => "librarian_network_availability",
        ErrorCategory::Transfer => "transfer",
    }
}
