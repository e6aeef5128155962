use thiserror::Error;

use crate::types::{ErrorCategory, ErrorSeverity};

/// Crate-wide error type. Variants map onto the error taxonomy kinds in
/// `SPEC_FULL.md` §7; each carries enough context for the HTTP layer to pick
/// a status code and for the background layer to record a durable `Error`
/// row with the right category/severity.
#[derive(Error, Debug)]
pub enum LibrarianError {
    #[error("checksum or size mismatch: {0}")]
    DataIntegrity(String),

    #[error("instance not present on disk: {0}")]
    DataAvailability(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("no store can admit this request: {0}")]
    StoreFull(String),

    #[error("programming error: {0}")]
    Programming(String),

    #[error("peer {peer} unreachable: {reason}")]
    PeerUnreachable { peer: String, reason: String },

    #[error("transfer {0} could not complete: {1}")]
    Transfer(i64, String),

    #[error("file already exists: {0}")]
    FileExists(String),

    #[error("transfer not found: {0}")]
    TransferNotFound(i64),

    #[error("illegal transfer status transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl LibrarianError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::DataIntegrity(_) => ErrorCategory::DataIntegrity,
            Self::DataAvailability(_) => ErrorCategory::DataAvailability,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::StoreFull(_) => ErrorCategory::StoreFull,
            Self::Programming(_) | Self::IllegalTransition { .. } => ErrorCategory::Programming,
            Self::PeerUnreachable { .. } => ErrorCategory::LibrarianNetworkAvailability,
            Self::Transfer(..) | Self::TransferNotFound(_) | Self::FileExists(_) => {
                ErrorCategory::Transfer
            }
            Self::Database(_) | Self::Io(_) | Self::Other(_) => ErrorCategory::Programming,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::DataIntegrity(_) => ErrorSeverity::Critical,
            Self::StoreFull(_) => ErrorSeverity::Error,
            Self::PeerUnreachable { .. } => ErrorSeverity::Warning,
            Self::Programming(_) | Self::IllegalTransition { .. } => ErrorSeverity::Critical,
            Self::DataAvailability(_) => ErrorSeverity::Error,
            _ => ErrorSeverity::Error,
        }
    }
}

pub type Result<T> = std::result::Result<T, LibrarianError>;
