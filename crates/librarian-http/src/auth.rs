//! Authentication and role enforcement for the HTTP surface.
//!
//! Two distinct credential kinds reach this server: human/CLI callers carry
//! a `Bearer` API key (`User`/`ApiKey`, `librarian-db::auth`), while peer
//! librarians carry HTTP Basic credentials matching the `authenticator`
//! `librarian-client::LibrarianClient::post` sends (`username:password` split
//! from a decrypted `Librarian.authenticator`, `SPEC_FULL.md` §9). Both
//! resolve to an `Identity` with a `UserRole`, so handlers only ever check
//! `UserRole::satisfies`.
//!
//! Grounded on `snow-owl-http/src/auth.rs`'s middleware/`AuthUser` shape;
//! `check_role`'s flat match is replaced by `UserRole::satisfies`'s rank
//! comparison since this role set has four tiers, not three.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use librarian_core::types::{Librarian, User, UserRole};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::AppState;

/// The authenticated caller, stored in request extensions once auth
/// succeeds.
#[derive(Clone, Debug)]
pub enum Identity {
    /// A human or service account authenticated with a Bearer API key.
    User(User),
    /// A peer librarian authenticated with HTTP Basic against its stored
    /// authenticator.
    Peer(Librarian),
}

impl Identity {
    pub fn role(&self) -> UserRole {
        match self {
            Self::User(user) => user.role,
            // A peer drives both the clone stage/fail surface and the
            // callback surface; ReadAppend outranks Callback in the
            // hierarchy so this satisfies both without granting Admin.
            Self::Peer(_) => UserRole::ReadAppend,
        }
    }

    /// The caller's own name: username for a `User`, librarian name for a
    /// peer. Used to check transfer-ownership authorization (`checkin/*`,
    /// `clone/fail`).
    pub fn name(&self) -> &str {
        match self {
            Self::User(user) => &user.username,
            Self::Peer(librarian) => &librarian.name,
        }
    }

    pub fn as_peer(&self) -> Option<&Librarian> {
        match self {
            Self::Peer(librarian) => Some(librarian),
            Self::User(_) => None,
        }
    }
}

pub fn generate_api_key() -> String {
    format!("lib_{}", uuid::Uuid::new_v4())
}

pub fn hash_api_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Require authentication; rejects with 401 on any failure.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> std::result::Result<Response, StatusCode> {
    match authenticate(&state, &request).await {
        Ok(Some(identity)) => {
            debug!(caller = %identity.name(), role = ?identity.role(), "authenticated request");
            request.extensions_mut().insert(identity);
            Ok(next.run(request).await)
        }
        Ok(None) => {
            warn!("unauthenticated request rejected");
            Err(StatusCode::UNAUTHORIZED)
        }
        Err(err) => {
            warn!(error = %err, "authentication error");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

async fn authenticate(
    state: &AppState,
    request: &Request,
) -> librarian_core::error::Result<Option<Identity>> {
    let Some(header) = request.headers().get(AUTHORIZATION).and_then(|h| h.to_str().ok()) else {
        return Ok(None);
    };

    if let Some(token) = header.strip_prefix("Bearer ") {
        let key_hash = hash_api_key(token);
        if let Some((user, api_key)) = state.db.validate_api_key(&key_hash).await? {
            state.db.touch_api_key_last_used(api_key.id).await.ok();
            return Ok(Some(Identity::User(user)));
        }
        return Ok(None);
    }

    if let Some(encoded) = header.strip_prefix("Basic ") {
        let Ok(decoded) = BASE64.decode(encoded) else {
            return Ok(None);
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return Ok(None);
        };
        let Some((username, password)) = decoded.split_once(':') else {
            return Ok(None);
        };

        let Some(librarian) = state.db.get_librarian_by_name(username).await? else {
            return Ok(None);
        };
        let expected = librarian_core::encryption::decrypt_authenticator(
            &librarian.authenticator,
            &state.config.authenticator_encryption_key,
        )?;
        let Some((_, expected_password)) = expected.split_once(':') else {
            return Ok(None);
        };
        if expected_password != password {
            return Ok(None);
        }

        state.db.touch_librarian_heard(&librarian.name, chrono::Utc::now()).await.ok();
        return Ok(Some(Identity::Peer(librarian)));
    }

    Ok(None)
}

/// Extract the authenticated identity inserted by `auth_middleware`.
pub fn identity(request: &Request) -> std::result::Result<Identity, StatusCode> {
    request
        .extensions()
        .get::<Identity>()
        .cloned()
        .ok_or(StatusCode::UNAUTHORIZED)
}

pub fn require_role(identity: &Identity, required: UserRole) -> std::result::Result<(), StatusCode> {
    if identity.role().satisfies(required) {
        Ok(())
    } else {
        Err(StatusCode::FORBIDDEN)
    }
}

/// Type alias so handlers can pull `Arc<AppState>`-style state without
/// importing axum's extractor machinery directly; kept for symmetry with
/// the teacher's `State<Arc<Database>>` handlers even though `AppState`
/// itself is cheaply `Clone`.
pub type SharedState = Arc<AppState>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_has_expected_prefix_and_is_unique() {
        let a = generate_api_key();
        let b = generate_api_key();
        assert!(a.starts_with("lib_"));
        assert_ne!(a, b);
    }

    #[test]
    fn hash_is_deterministic_hex_sha256() {
        let h1 = hash_api_key("lib_test-key");
        let h2 = hash_api_key("lib_test-key");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert_ne!(h1, "lib_test-key");
    }

    #[test]
    fn role_hierarchy_matches_callback_tier() {
        assert!(UserRole::Admin.satisfies(UserRole::ReadAppend));
        assert!(UserRole::ReadAppend.satisfies(UserRole::Callback));
        assert!(!UserRole::Callback.satisfies(UserRole::ReadAppend));
        assert!(UserRole::Callback.satisfies(UserRole::ReadOnly));
        assert!(!UserRole::ReadOnly.satisfies(UserRole::Callback));
    }
}
