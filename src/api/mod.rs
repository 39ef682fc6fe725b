//! HTTP boundary.
//!
//! Every route authenticates through [`auth::AuthenticatedCaller`],
//! checks the caller's tier, and delegates to one service object held in
//! [`AppState`]. Errors leave through [`error::ApiError`].

pub mod auth;
pub mod error;
pub mod routes;
pub mod sse;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::auth::CredentialVerifier;
use crate::backup::BackupManager;
use crate::logs::LogHub;
use crate::policy::CommandPolicy;
use crate::rcon::RconClient;
use crate::sandbox::Sandbox;
use crate::supervisor::ProcessSupervisor;
use crate::{AppError, GlobalConfig, Result};

/// Long-lived services shared by every request.
pub struct AppState {
    /// Validated configuration.
    pub config: Arc<GlobalConfig>,
    /// Worker lifecycle.
    pub supervisor: Arc<ProcessSupervisor>,
    /// Console connection.
    pub rcon: RconClient,
    /// Captured output.
    pub logs: Arc<LogHub>,
    /// Backup archives.
    pub backups: BackupManager,
    /// File access.
    pub sandbox: Arc<Sandbox>,
    /// Console command filter.
    pub policy: CommandPolicy,
    /// Credential check.
    pub verifier: Arc<dyn CredentialVerifier>,
}

/// Handler for `GET /health`.
async fn health() -> &'static str {
    "ok"
}

/// Build the router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(routes::status))
        .route("/api/server/start", post(routes::start_server))
        .route("/api/server/stop", post(routes::stop_server))
        .route("/api/server/restart", post(routes::restart_server))
        .route("/api/server/kill", post(routes::kill_server))
        .route("/api/logs", get(routes::log_history))
        .route("/api/logs/stream", get(sse::stream_logs))
        .route("/api/command", post(routes::send_command))
        .route(
            "/api/backups",
            get(routes::list_backups).post(routes::create_backup),
        )
        .route(
            "/api/backups/{id}",
            axum::routing::delete(routes::delete_backup),
        )
        .route("/api/backups/{id}/restore", post(routes::restore_backup))
        .route("/api/backups/{id}/download", get(routes::download_backup))
        .route(
            "/api/files",
            get(routes::list_files).delete(routes::delete_file),
        )
        .route(
            "/api/files/content",
            get(routes::read_file).put(routes::write_file),
        )
        .with_state(state)
}

/// Bind `http_bind:http_port` and serve until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Config` if the server fails to bind.
pub async fn serve(state: Arc<AppState>, ct: CancellationToken) -> Result<()> {
    let bind = format!("{}:{}", state.config.http_bind, state.config.http_port);
    let listener = TcpListener::bind(&bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind HTTP on {bind}: {err}")))?;
    serve_on(listener, state, ct).await
}

/// Serve on an already-bound listener until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Io` if the server fails.
pub async fn serve_on(
    listener: TcpListener,
    state: Arc<AppState>,
    ct: CancellationToken,
) -> Result<()> {
    let local = listener.local_addr()?;
    info!(%local, "starting HTTP API");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Io(format!("HTTP server error: {err}")))?;

    info!("HTTP API shut down");
    Ok(())
}
