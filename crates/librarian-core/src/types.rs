use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Content hash algorithms a store or peer may tag a checksum with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Xxh3,
}

impl ChecksumAlgorithm {
    /// Infer an algorithm from a bare hex digest length, for the legacy
    /// unprefixed checksum format.
    pub fn infer_from_hex_len(len: usize) -> Option<Self> {
        match len {
            32 => Some(Self::Md5),
            40 => Some(Self::Sha1),
            64 => Some(Self::Sha256),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Xxh3 => "xxh3",
        }
    }
}

impl std::str::FromStr for ChecksumAlgorithm {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "md5" => Ok(Self::Md5),
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            "xxh3" => Ok(Self::Xxh3),
            other => anyhow::bail!("unknown checksum algorithm: {other}"),
        }
    }
}

/// A tagged content checksum, `<algo>:<hex>`. The legacy unprefixed form is
/// accepted on parse; the algorithm is then inferred from the digest length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Checksum {
    pub algorithm: ChecksumAlgorithm,
    pub hex: String,
}

impl Checksum {
    pub fn new(algorithm: ChecksumAlgorithm, hex: impl Into<String>) -> Self {
        Self {
            algorithm,
            hex: hex.into(),
        }
    }
}

impl std::fmt::Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm.as_str(), self.hex)
    }
}

impl std::str::FromStr for Checksum {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some((algo, hex)) = s.split_once(':') {
            if let Ok(algorithm) = algo.parse::<ChecksumAlgorithm>() {
                return Ok(Self::new(algorithm, hex));
            }
        }

        // Legacy unprefixed form: infer the algorithm from the hex length.
        let algorithm = ChecksumAlgorithm::infer_from_hex_len(s.len())
            .ok_or_else(|| anyhow::anyhow!("cannot infer checksum algorithm from {s:?}"))?;
        Ok(Self::new(algorithm, s))
    }
}

impl TryFrom<String> for Checksum {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Checksum> for String {
    fn from(value: Checksum) -> Self {
        value.to_string()
    }
}

/// Shared status lattice for IncomingTransfer, OutgoingTransfer and
/// CloneTransfer: `INITIATED -> ONGOING -> STAGED -> COMPLETED`, with
/// `FAILED`/`CANCELLED` reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Initiated,
    Ongoing,
    Staged,
    Completed,
    Failed,
    Cancelled,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether a direct, forward, server-local transition from `self` to
    /// `next` is allowed by the lattice (ignoring the separate
    /// `checkin/update` peer-driven table, which is stricter).
    pub fn can_transition_to(&self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        if matches!(next, Self::Failed | Self::Cancelled) {
            return true;
        }
        matches!(
            (self, next),
            (Self::Initiated, Self::Ongoing)
                | (Self::Ongoing, Self::Staged)
                | (Self::Staged, Self::Completed)
        )
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initiated => "initiated",
            Self::Ongoing => "ongoing",
            Self::Staged => "staged",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TransferStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initiated" => Ok(Self::Initiated),
            "ongoing" => Ok(Self::Ongoing),
            "staged" => Ok(Self::Staged),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => anyhow::bail!("unknown transfer status: {other}"),
        }
    }
}

/// Whether an Instance may be deleted by rolling deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionPolicy {
    Allowed,
    Disallowed,
}

impl std::fmt::Display for DeletionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Allowed => write!(f, "allowed"),
            Self::Disallowed => write!(f, "disallowed"),
        }
    }
}

impl std::str::FromStr for DeletionPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allowed" => Ok(Self::Allowed),
            "disallowed" => Ok(Self::Disallowed),
            other => anyhow::bail!("unknown deletion policy: {other}"),
        }
    }
}

/// A File: identified by its globally unique `name`, which is the primary
/// key. `(size, checksum)` are immutable once set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    pub name: String,
    pub size: i64,
    pub checksum: Checksum,
    pub uploader: String,
    pub source: String,
    pub create_time: DateTime<Utc>,
}

/// A local copy of a File on one Store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: i64,
    pub file_name: String,
    pub store_id: i64,
    pub path: String,
    pub deletion_policy: DeletionPolicy,
    pub created_time: DateTime<Utc>,
    pub available: bool,
}

/// This librarian's belief that a peer holds a copy of a File.
///
/// `remote_store_id` is opaque: it names a store on the peer, not a row in
/// our own `stores` table, so it is carried as a plain integer rather than a
/// foreign key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteInstance {
    pub id: i64,
    pub file_name: String,
    pub librarian_name: String,
    pub remote_store_id: i64,
    pub copy_time: DateTime<Utc>,
    pub sender: String,
}

/// A named, typed storage back-end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    pub id: i64,
    pub name: String,
    pub store_type: String,
    pub store_data: serde_json::Value,
    pub transfer_managers: Vec<String>,
    pub async_transfer_managers: Vec<String>,
    pub ingestable: bool,
    pub enabled: bool,
}

/// A named remote librarian known to this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Librarian {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub port: u16,
    /// Encrypted `username:password` authenticator. Decrypted only by
    /// `librarian-client` at the point of use.
    pub authenticator: String,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_heard: Option<DateTime<Utc>>,
    pub transfers_enabled: bool,
}

/// Durable record of an in-flight inbound transfer (upload or clone
/// destination side).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingTransfer {
    pub id: i64,
    pub status: TransferStatus,
    pub source: String,
    pub uploader: String,
    pub upload_name: String,
    pub source_transfer_id: Option<i64>,
    pub store_id: Option<i64>,
    pub staging_path: Option<String>,
    pub store_path: Option<String>,
    pub transfer_size: i64,
    pub transfer_checksum: Checksum,
    pub transfer_manager_name: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Durable record of an in-flight outbound transfer (clone source side).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingTransfer {
    pub id: i64,
    pub status: TransferStatus,
    pub file_name: String,
    pub destination: String,
    pub remote_transfer_id: Option<i64>,
    pub instance_id: Option<i64>,
    pub source_path: Option<String>,
    pub dest_path: Option<String>,
    pub transfer_size: i64,
    pub transfer_checksum: Checksum,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Durable record of a local cross-store copy. Mirrors the transfer
/// lattice, but both sides are local stores on this librarian.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneTransfer {
    pub id: i64,
    pub status: TransferStatus,
    pub file_name: String,
    pub source_store_id: i64,
    pub dest_store_id: i64,
    pub staging_path: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

/// One leg of an async batch transfer: a local source path paired with the
/// destination-relative path the peer staged for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferPath {
    pub source_path: String,
    pub dest_path: String,
}

/// A tagged async transfer manager capability, persisted as JSON on a
/// SendQueue row. Replaces the original implementation's picklable object
/// graph (see `SPEC_FULL.md` §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum AsyncTransferManager {
    Local {
        /// Internal bookkeeping: which paths have been copied so far, so
        /// `transfer_status` can be computed without re-touching the
        /// filesystem for already-copied entries.
        completed: Vec<String>,
    },
    Rsync {
        remote_host: String,
        remote_user: String,
        /// Set once the rsync invocation has been dispatched; `None` means
        /// not yet started from this manager's point of view.
        remote_task_id: Option<String>,
    },
    Globus {
        source_endpoint: String,
        destination_endpoint: String,
        task_id: Option<String>,
    },
}

impl AsyncTransferManager {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Local { .. } => "local",
            Self::Rsync { .. } => "rsync",
            Self::Globus { .. } => "globus",
        }
    }
}

/// A row in the durable send-queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendQueueItem {
    pub id: i64,
    pub priority: i32,
    pub destination: String,
    pub created_time: DateTime<Utc>,
    pub retries: i32,
    pub async_transfer_manager: AsyncTransferManager,
    pub consumed: bool,
    pub consumed_time: Option<DateTime<Utc>>,
    pub completed: bool,
    pub completed_time: Option<DateTime<Utc>>,
    pub failed: bool,
}

/// Severity of a durable diagnostic `Error` row or log emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// Error taxonomy kind, per `SPEC_FULL.md` §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    DataIntegrity,
    DataAvailability,
    Configuration,
    StoreFull,
    Programming,
    LibrarianNetworkAvailability,
    Transfer,
}

/// A durable diagnostic record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub id: i64,
    pub severity: ErrorSeverity,
    pub category: ErrorCategory,
    pub message: String,
    pub raised_time: DateTime<Utc>,
    pub cleared_time: Option<DateTime<Utc>>,
    pub cleared: bool,
}

/// A marker that an Instance's on-disk bytes no longer match its recorded
/// size/checksum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorruptFile {
    pub id: i64,
    pub file_name: String,
    pub instance_id: i64,
    pub size: i64,
    pub checksum: Checksum,
    pub count: i32,
    pub corrupt_time: DateTime<Utc>,
}

/// Role hierarchy for the auth layer: `Admin > ReadAppend > Callback >
/// ReadOnly`. `Callback` sits between `ReadAppend` and `ReadOnly` because it
/// may only drive the peer-callback endpoints (`ongoing`/`staged`/
/// `complete`), a narrower surface than general append access, but it still
/// requires a registered identity unlike anonymous read access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    ReadAppend,
    Callback,
    ReadOnly,
}

impl UserRole {
    fn rank(&self) -> u8 {
        match self {
            Self::Admin => 3,
            Self::ReadAppend => 2,
            Self::Callback => 1,
            Self::ReadOnly => 0,
        }
    }

    pub fn satisfies(&self, required: UserRole) -> bool {
        self.rank() >= required.rank()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub user_id: Uuid,
    pub key_hash: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_round_trips_tagged_form() {
        let c: Checksum = "sha256:abcdef".parse().unwrap();
        assert_eq!(c.algorithm, ChecksumAlgorithm::Sha256);
        assert_eq!(c.to_string(), "sha256:abcdef");
    }

    #[test]
    fn checksum_infers_algorithm_from_legacy_form() {
        let md5_hex = "a".repeat(32);
        let c: Checksum = md5_hex.parse().unwrap();
        assert_eq!(c.algorithm, ChecksumAlgorithm::Md5);

        let sha1_hex = "b".repeat(40);
        let c: Checksum = sha1_hex.parse().unwrap();
        assert_eq!(c.algorithm, ChecksumAlgorithm::Sha1);
    }

    #[test]
    fn transfer_status_terminal_states_reject_transitions() {
        assert!(!TransferStatus::Completed.can_transition_to(TransferStatus::Failed));
        assert!(!TransferStatus::Failed.can_transition_to(TransferStatus::Ongoing));
    }

    #[test]
    fn transfer_status_forward_lattice() {
        assert!(TransferStatus::Initiated.can_transition_to(TransferStatus::Ongoing));
        assert!(TransferStatus::Ongoing.can_transition_to(TransferStatus::Staged));
        assert!(TransferStatus::Staged.can_transition_to(TransferStatus::Completed));
        assert!(!TransferStatus::Initiated.can_transition_to(TransferStatus::Staged));
        assert!(TransferStatus::Initiated.can_transition_to(TransferStatus::Cancelled));
    }

    #[test]
    fn role_hierarchy_matches_spec() {
        assert!(UserRole::Admin.satisfies(UserRole::ReadOnly));
        assert!(UserRole::ReadAppend.satisfies(UserRole::ReadAppend));
        assert!(!UserRole::ReadOnly.satisfies(UserRole::ReadAppend));
        assert!(!UserRole::Callback.satisfies(UserRole::ReadAppend));
        assert!(UserRole::Callback.satisfies(UserRole::Callback));
    }
}
