//! axum HTTP surface: upload/clone/checkin/search/validate/ping, plus the
//! dual Bearer/Basic auth layer in `auth`.
//!
//! Grounded on `snow-owl-http/src/lib.rs`'s `HttpServer`/`create_router`
//! shape; TLS (`run_https`/`load_tls_config`) is dropped since nothing in
//! `SPEC_FULL.md` calls for it — peer calls are plain HTTP behind whatever
//! transport the deployment fronts it with, matching
//! `original_source/librarian_server/server.py`.

pub mod api;
pub mod auth;
pub mod error;
pub mod models;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::post;
use axum::Router;
use librarian_client::LibrarianClient;
use librarian_core::encryption::decrypt_authenticator;
use librarian_core::error::{LibrarianError, Result};
use librarian_core::types::Librarian;
use librarian_core::Config;
use librarian_db::Database;
use librarian_store::StoreManager;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub stores: Arc<HashMap<String, Arc<dyn StoreManager>>>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: Database, stores: HashMap<String, Arc<dyn StoreManager>>, config: Config) -> Self {
        Self {
            db,
            stores: Arc::new(stores),
            config: Arc::new(config),
        }
    }

    pub fn store(&self, name: &str) -> Result<Arc<dyn StoreManager>> {
        self.stores
            .get(name)
            .cloned()
            .ok_or_else(|| LibrarianError::Configuration(format!("unknown store: {name}")))
    }

    /// Build a client for `librarian`, decrypting its stored authenticator
    /// with this server's own encryption key. Used by `validate/file` to
    /// delegate checksum checks to peers holding a `RemoteInstance`.
    pub fn client_for(&self, librarian: &Librarian) -> Result<LibrarianClient> {
        let plaintext = decrypt_authenticator(
            &librarian.authenticator,
            &self.config.authenticator_encryption_key,
        )?;
        let (user, password) = librarian_client::split_authenticator(&plaintext)?;
        Ok(LibrarianClient::new(
            &librarian.url,
            librarian.port,
            user,
            password,
        ))
    }
}

pub struct HttpServer {
    state: AppState,
}

impl HttpServer {
    pub fn new(db: Database, stores: HashMap<String, Arc<dyn StoreManager>>, config: Config) -> Self {
        Self {
            state: AppState::new(db, stores, config),
        }
    }

    pub async fn run(&self) -> Result<()> {
        let app = self.create_router();
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        info!("HTTP server listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .await
            .map_err(|e| LibrarianError::Configuration(e.to_string()))?;

        Ok(())
    }

    pub fn create_router(&self) -> Router {
        Router::new()
            .route("/api/v2/upload/stage", post(api::upload::stage))
            .route("/api/v2/upload/commit", post(api::upload::commit))
            .route("/api/v2/clone/stage", post(api::clone::stage))
            .route("/api/v2/clone/batch_stage", post(api::clone::batch_stage))
            .route("/api/v2/clone/ongoing", post(api::clone::ongoing))
            .route("/api/v2/clone/staged", post(api::clone::staged))
            .route("/api/v2/clone/complete", post(api::clone::complete))
            .route("/api/v2/clone/fail", post(api::clone::fail))
            .route("/api/v2/checkin/status", post(api::checkin::status))
            .route("/api/v2/checkin/update", post(api::checkin::update))
            .route("/api/v2/search/file", post(api::search::search_file))
            .route("/api/v2/validate/file", post(api::validate::validate_file))
            .route("/api/v2/ping", post(api::ping::ping))
            .layer(axum::middleware::from_fn_with_state(
                self.state.clone(),
                auth::auth_middleware,
            ))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }
}
