//! Maps `LibrarianError` onto HTTP responses.
//!
//! Every failure response on the wire is a `librarian_client::models::ErrorBody`
//! JSON object, the same shape `LibrarianClient` already knows how to parse
//! on the calling side (`SPEC_FULL.md` §7). Handlers that need a status code
//! the category mapping doesn't produce (406, 409, 413, 425 — all admission
//! decisions rather than faults) build an `ApiError` directly instead of
//! going through `From<LibrarianError>`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use librarian_client::models::ErrorBody;
use librarian_core::error::LibrarianError;
use librarian_core::types::ErrorCategory;
use tracing::error;

pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, reason: impl Into<String>, suggested_remedy: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                reason: reason.into(),
                suggested_remedy: suggested_remedy.into(),
                source_transfer_id: None,
                destination_transfer_id: None,
            },
        }
    }

    pub fn with_source_transfer_id(mut self, id: i64) -> Self {
        self.body.source_transfer_id = Some(id);
        self
    }

    pub fn with_destination_transfer_id(mut self, id: i64) -> Self {
        self.body.destination_transfer_id = Some(id);
        self
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, reason, "verify the identifier and retry")
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, reason, "correct the request body and retry")
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, reason, "resolve the conflicting resource before retrying")
    }

    pub fn not_acceptable(reason: impl Into<String>) -> Self {
        Self::new(
            StatusCode::NOT_ACCEPTABLE,
            reason,
            "wait for the in-flight transfer to resolve, then retry",
        )
    }

    pub fn too_early(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::TOO_EARLY, reason, "retry once the ongoing transfer completes")
    }

    pub fn payload_too_large(reason: impl Into<String>) -> Self {
        Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            reason,
            "reduce the transfer size or raise the configured maximum",
        )
    }
}

impl From<StatusCode> for ApiError {
    fn from(status: StatusCode) -> Self {
        let reason = match status {
            StatusCode::UNAUTHORIZED => "missing or invalid credentials",
            StatusCode::FORBIDDEN => "caller's role does not permit this operation",
            _ => "request rejected",
        };
        Self::new(status, reason, "authenticate with sufficient privileges and retry")
    }
}

impl From<LibrarianError> for ApiError {
    fn from(err: LibrarianError) -> Self {
        let status = match err.category() {
            ErrorCategory::DataIntegrity => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCategory::DataAvailability => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCategory::Configuration => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCategory::StoreFull => StatusCode::INSUFFICIENT_STORAGE,
            ErrorCategory::Programming => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCategory::LibrarianNetworkAvailability => StatusCode::BAD_GATEWAY,
            ErrorCategory::Transfer => match &err {
                LibrarianError::TransferNotFound(_) => StatusCode::NOT_FOUND,
                LibrarianError::FileExists(_) => StatusCode::CONFLICT,
                _ => StatusCode::UNPROCESSABLE_ENTITY,
            },
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %err, "unhandled internal error");
        }

        let suggested_remedy = match &err {
            LibrarianError::PeerUnreachable { .. } => "retry once the peer librarian is reachable",
            LibrarianError::StoreFull(_) => "free space on a backing store or add capacity",
            LibrarianError::DataIntegrity(_) => "the transfer is corrupt; discard it and retry from source",
            LibrarianError::TransferNotFound(_) => "verify the transfer identifier",
            LibrarianError::FileExists(_) => "choose a different destination name",
            _ => "contact an administrator if the problem persists",
        };

        Self::new(status, err.to_string(), suggested_remedy)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
