//! HTTP surface.
//!
//! | Method | Path                     | Auth   |
//! |--------|--------------------------|--------|
//! | GET    | `/health`                | none   |
//! | POST   | `/parse`                 | bearer |
//! | GET    | `/attachments/:id`       | bearer |
//! | POST   | `/attachments/:id/link`  | bearer |
//! | GET    | `/download/:token`       | none   |

pub mod auth;
pub mod error;
pub mod handlers;
pub mod view;

use std::future::Future;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::{Config, DownloadMode};
use crate::pipeline::AttachmentPipeline;
use crate::policy::SizePolicy;
use crate::store::{AttachmentVault, TokenRegistry};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub vault: Arc<AttachmentVault>,
    pub tokens: Arc<TokenRegistry>,
    pub pipeline: AttachmentPipeline,
    /// Public base URL without a trailing slash.
    pub base_url: Arc<str>,
}

impl AppState {
    /// Build fresh registries and a pipeline from `config`.
    pub fn new(config: Config) -> Self {
        let vault = Arc::new(AttachmentVault::new(
            config.attachments.dir.clone(),
            config.attachment_ttl(),
        ));
        let tokens = Arc::new(
            TokenRegistry::new(config.temp_token_ttl())
                .with_single_use(config.attachments.single_use_tokens),
        );
        let pipeline = AttachmentPipeline::new(
            Arc::clone(&vault),
            SizePolicy::new(config.attachments.max_size),
        );
        Self {
            base_url: config.base_url().into(),
            config: Arc::new(config),
            vault,
            tokens,
            pipeline,
        }
    }

    /// `downloadUrl` for a stored attachment, according to the download mode.
    pub fn attachment_url(&self, id: &str) -> String {
        match self.config.attachments.download_mode {
            DownloadMode::Direct => format!("{}/attachments/{id}", self.base_url),
            DownloadMode::Token => format!("{}/attachments/{id}/link", self.base_url),
        }
    }
}

/// The application router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit;

    let protected = Router::new()
        .route("/parse", post(handlers::parse))
        .route("/attachments/:id", get(handlers::download_attachment))
        .route("/attachments/:id/link", post(handlers::issue_link))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/download/:token", get(handlers::download_with_token))
        .merge(protected)
        .fallback(handlers::no_route)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `state` on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
