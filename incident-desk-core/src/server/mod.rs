//! HTTP API and static file server
//!
//! Routes:
//!
//! - `GET /health`
//! - `POST /api/reports` (multipart submission, any verified user)
//! - `POST /api/admin/check`
//! - `GET /api/reports`, `GET|PATCH|DELETE /api/reports/{id}` (administrators)
//! - `GET /uploads/*` photos, everything else from the mini-app directory
//!
//! Every API route verifies `initData` before touching storage.

pub mod auth;
pub mod error;
mod handlers;

pub use error::ApiError;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Request, StatusCode};
use axum::middleware::map_response;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::{AdminSet, InitDataVerifier};
use crate::config::DeskConfig;
use crate::relay::Relay;
use crate::report::{JsonFileStore, ReportStore};
use crate::uploads::UploadStore;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub verifier: InitDataVerifier,
    pub admins: Arc<AdminSet>,
    pub store: Arc<dyn ReportStore>,
    pub uploads: Arc<UploadStore>,
    pub relay: Arc<Relay>,
    pub public_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(
        verifier: InitDataVerifier,
        admins: AdminSet,
        store: Arc<dyn ReportStore>,
        uploads: UploadStore,
        relay: Relay,
    ) -> Self {
        Self {
            verifier,
            admins: Arc::new(admins),
            store,
            uploads: Arc::new(uploads),
            relay: Arc::new(relay),
            public_dir: None,
        }
    }

    /// Serve the mini-app from this directory for unmatched paths
    pub fn with_public_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.public_dir = Some(dir.into());
        self
    }

    pub fn from_config(config: &DeskConfig) -> Result<Self> {
        let verifier = config.verifier()?;
        let admins = config.admin_set();
        info!(
            "Signing key variant: {}, {} administrator(s)",
            verifier.variant(),
            admins.len()
        );

        let store: Arc<dyn ReportStore> =
            Arc::new(JsonFileStore::new(&config.storage.reports_file));
        let uploads = UploadStore::new(&config.storage.uploads_dir, config.uploads);
        let relay = Relay::from_config(config).context("Failed to set up report relay")?;

        let state = Self::new(verifier, admins, store, uploads, relay);
        Ok(match &config.storage.public_dir {
            Some(dir) => state.with_public_dir(dir),
            None => state,
        })
    }
}

/// Build the router with tracing and body limits applied
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.uploads.limits().max_request_bytes();
    let uploads = ServeDir::new(state.uploads.dir());
    let public_dir = state.public_dir.clone();

    let router = Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/reports",
            post(handlers::create_report).get(handlers::list_reports),
        )
        .route(
            "/api/reports/{id}",
            get(handlers::get_report)
                .patch(handlers::update_report)
                .delete(handlers::delete_report),
        )
        .route("/api/admin/check", post(handlers::admin_check))
        .nest_service("/uploads", uploads);

    let router = match public_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router.fallback(handlers::not_found),
    };

    router
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(map_response(json_payload_too_large))
        .layer(
            // Path only: the query string may carry initData
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "http.request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
        .with_state(state)
}

/// The body limit answers in plain text; give it the usual error shape
async fn json_payload_too_large(response: Response) -> Response {
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .is_some_and(|value| value.as_bytes().starts_with(b"application/json"));
    if response.status() == StatusCode::PAYLOAD_TOO_LARGE && !is_json {
        return ApiError::PayloadTooLarge.into_response();
    }
    response
}

/// Bind the configured address and serve until `shutdown` resolves
pub async fn serve<F>(config: &DeskConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    config.validate()?;
    let addr = config.listen_addr()?;

    tokio::fs::create_dir_all(&config.storage.uploads_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create uploads directory {}",
                config.storage.uploads_dir.display()
            )
        })?;

    let state = AppState::from_config(config)?;
    let app = build_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Incident Desk listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")?;

    info!("Server stopped");
    Ok(())
}
