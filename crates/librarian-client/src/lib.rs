//! HTTP client for outbound peer-to-peer librarian calls.
//!
//! Grounded on `original_source/hera_librarian/client.py`'s `LibrarianClient`:
//! a single `post(endpoint, request) -> response` helper, HTTP Basic auth
//! with a `(user, password)` pair split from the stored authenticator, and a
//! dedicated unreachable-peer error on timeout/connection failure
//! (`SPEC_FULL.md` §4.7).

pub mod models;

use std::time::Duration;

use librarian_core::error::{LibrarianError, Result};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

pub use models::*;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Split an encrypted-at-rest `"username:password"` authenticator into its
/// two parts. Decryption itself happens one layer up, in the caller that
/// holds `Config::authenticator_encryption_key`; this client only ever sees
/// plaintext credentials.
pub fn split_authenticator(authenticator: &str) -> Result<(String, String)> {
    authenticator
        .split_once(':')
        .map(|(user, pass)| (user.to_string(), pass.to_string()))
        .ok_or_else(|| {
            LibrarianError::Configuration("authenticator is not in 'username:password' form".to_string())
        })
}

/// A client for one remote librarian's API.
#[derive(Clone)]
pub struct LibrarianClient {
    base_url: String,
    username: String,
    password: String,
    http: reqwest::Client,
}

impl LibrarianClient {
    pub fn new(host: &str, port: u16, username: impl Into<String>, password: impl Into<String>) -> Self {
        let host = host.trim_end_matches('/');
        let base_url = format!("{host}:{port}/api/v2");

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .expect("reqwest client with static config always builds");

        Self {
            base_url,
            username: username.into(),
            password: password.into(),
            http,
        }
    }

    fn resolve(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    async fn post<Req, Resp>(&self, endpoint: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = self.resolve(endpoint);

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .json(request)
            .send()
            .await
            .map_err(|e| LibrarianError::PeerUnreachable {
                peer: url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body: ErrorBody = response.json().await.unwrap_or(ErrorBody {
                reason: "<no reason provided>".to_string(),
                suggested_remedy: "<no suggested remedy provided>".to_string(),
                source_transfer_id: None,
                destination_transfer_id: None,
            });
            warn!(%url, %status, reason = %body.reason, "peer returned an error response");
            return Err(LibrarianError::PeerUnreachable {
                peer: url,
                reason: format!("{status}: {}", body.reason),
            });
        }

        debug!(%url, "peer call succeeded");
        response
            .json::<Resp>()
            .await
            .map_err(|e| LibrarianError::Other(anyhow::anyhow!("invalid peer response: {e}")))
    }

    pub async fn ping(&self) -> Result<PingResponse> {
        self.post("ping", &PingRequest::default()).await
    }

    pub async fn search_file(&self, request: &SearchFileRequest) -> Result<SearchFileResponse> {
        self.post("search/file", request).await
    }

    pub async fn validate_file(&self, request: &ValidateFileRequest) -> Result<ValidateFileResponse> {
        self.post("validate/file", request).await
    }

    pub async fn clone_stage(&self, request: &CloneStageRequest) -> Result<CloneStageResponseItem> {
        self.post("clone/stage", request).await
    }

    pub async fn clone_batch_stage(
        &self,
        request: &CloneBatchStageRequest,
    ) -> Result<CloneBatchStageResponse> {
        self.post("clone/batch_stage", request).await
    }

    pub async fn clone_ongoing(&self, request: &CloneTransferIdPair) -> Result<CloneAckResponse> {
        self.post("clone/ongoing", request).await
    }

    pub async fn clone_staged(&self, request: &CloneTransferIdPair) -> Result<CloneAckResponse> {
        self.post("clone/staged", request).await
    }

    pub async fn clone_complete(&self, request: &CloneCompleteRequest) -> Result<CloneAckResponse> {
        self.post("clone/complete", request).await
    }

    pub async fn clone_fail(&self, request: &CloneTransferIdPair) -> Result<CloneAckResponse> {
        self.post("clone/fail", request).await
    }

    pub async fn checkin_status(&self, request: &CheckinStatusRequest) -> Result<CheckinStatusResponse> {
        self.post("checkin/status", request).await
    }

    pub async fn checkin_update(&self, request: &CheckinUpdateRequest) -> Result<CheckinUpdateResponse> {
        self.post("checkin/update", request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_authenticator_on_first_colon() {
        let (user, pass) = split_authenticator("alice:s3cret:with:colons").unwrap();
        assert_eq!(user, "alice");
        assert_eq!(pass, "s3cret:with:colons");
    }

    #[test]
    fn rejects_authenticator_without_colon() {
        assert!(split_authenticator("no-colon-here").is_err());
    }

    #[test]
    fn resolve_joins_base_and_endpoint() {
        let client = LibrarianClient::new("http://peer.example", 8080, "u", "p");
        assert_eq!(
            client.resolve("ping"),
            "http://peer.example:8080/api/v2/ping"
        );
        assert_eq!(
            client.resolve("/clone/stage"),
            "http://peer.example:8080/api/v2/clone/stage"
        );
    }
}
