//! JSON route handlers.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tracing::info;

use super::auth::AuthenticatedCaller;
use super::error::ApiError;
use super::AppState;
use crate::models::backup::{BackupKind, BackupRecord, StorageUsage};
use crate::models::file_entry::FileEntry;
use crate::models::permission::PermissionTier;
use crate::rcon::ConnectionState;
use crate::supervisor::WorkerStatus;
use crate::AppError;

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Default number of history lines.
const DEFAULT_HISTORY_LINES: usize = 100;

// ── Status & lifecycle ───────────────────────────────────────────────────────

/// Response body for `GET /api/status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Worker process snapshot.
    #[serde(flatten)]
    pub worker: WorkerStatus,
    /// RCON link state.
    pub rcon: ConnectionState,
    /// Ticks per second, when available.
    pub tps: Option<f64>,
    /// Online players.
    pub players: Vec<String>,
}

/// `GET /api/status`
pub async fn status(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
) -> ApiResult<Json<StatusResponse>> {
    caller.require(PermissionTier::Moderator)?;

    let worker = state.supervisor.status();
    let (tps, players) = if worker.running {
        (state.rcon.tick_rate().await, state.rcon.player_list().await)
    } else {
        (None, Vec::new())
    };

    Ok(Json(StatusResponse {
        worker,
        rcon: state.rcon.state(),
        tps,
        players,
    }))
}

/// Response body for lifecycle actions.
#[derive(Debug, Serialize)]
pub struct LifecycleResponse {
    /// Action performed.
    pub action: &'static str,
    /// Worker snapshot after the action.
    pub status: WorkerStatus,
}

/// `POST /api/server/start`
pub async fn start_server(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
) -> ApiResult<Json<LifecycleResponse>> {
    caller.require(PermissionTier::Admin)?;
    info!(subject = %caller.subject, "start requested");
    let status = state.supervisor.start()?;
    Ok(Json(LifecycleResponse {
        action: "start",
        status,
    }))
}

/// `POST /api/server/stop`
pub async fn stop_server(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
) -> ApiResult<Json<LifecycleResponse>> {
    caller.require(PermissionTier::Admin)?;
    info!(subject = %caller.subject, "stop requested");
    state.supervisor.stop().await?;
    Ok(Json(LifecycleResponse {
        action: "stop",
        status: state.supervisor.status(),
    }))
}

/// `POST /api/server/restart`
pub async fn restart_server(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
) -> ApiResult<Json<LifecycleResponse>> {
    caller.require(PermissionTier::Admin)?;
    info!(subject = %caller.subject, "restart requested");
    let status = state.supervisor.restart().await?;
    Ok(Json(LifecycleResponse {
        action: "restart",
        status,
    }))
}

/// `POST /api/server/kill`
pub async fn kill_server(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
) -> ApiResult<Json<LifecycleResponse>> {
    caller.require(PermissionTier::Admin)?;
    info!(subject = %caller.subject, "kill requested");
    state.supervisor.kill().await?;
    Ok(Json(LifecycleResponse {
        action: "kill",
        status: state.supervisor.status(),
    }))
}

// ── Logs & console ───────────────────────────────────────────────────────────

/// Query for `GET /api/logs`.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Requested line count; clamped to the history maximum.
    pub lines: Option<usize>,
}

/// `GET /api/logs`
pub async fn log_history(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    caller.require(PermissionTier::Moderator)?;
    let lines = state
        .supervisor
        .history(query.lines.unwrap_or(DEFAULT_HISTORY_LINES));
    Ok(Json(serde_json::json!({ "lines": lines })))
}

/// Body for `POST /api/command`.
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    /// Console command, with or without a leading `/`.
    pub command: String,
}

/// `POST /api/command`
pub async fn send_command(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Json(body): Json<CommandRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    caller.require(PermissionTier::Moderator)?;

    let command = body.command.trim();
    if command.is_empty() {
        return Err(AppError::InvalidInput("command must not be empty".into()).into());
    }

    let decision = state.policy.evaluate(command, caller.tier);
    if !decision.allowed {
        let reason = decision
            .reason
            .unwrap_or_else(|| "command not allowed".to_owned());
        return Err(AppError::Denied(reason).into());
    }

    if !state.supervisor.is_running() {
        return Err(AppError::Precondition("server is not running".into()).into());
    }

    let command = command.strip_prefix('/').unwrap_or(command);
    info!(subject = %caller.subject, command, "forwarding console command");
    let response = state.rcon.send_command(command).await?;
    Ok(Json(serde_json::json!({ "response": response })))
}

// ── Backups ──────────────────────────────────────────────────────────────────

/// Response body for `GET /api/backups`.
#[derive(Debug, Serialize)]
pub struct BackupListResponse {
    /// Records, newest first.
    pub backups: Vec<BackupRecord>,
    /// Storage consumption.
    pub usage: StorageUsage,
}

/// `GET /api/backups`
pub async fn list_backups(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
) -> ApiResult<Json<BackupListResponse>> {
    caller.require(PermissionTier::Admin)?;
    let backups = state.backups.list_backups().await?;
    let usage = state.backups.storage_usage().await?;
    Ok(Json(BackupListResponse { backups, usage }))
}

/// Body for `POST /api/backups`.
#[derive(Debug, Deserialize)]
pub struct CreateBackupRequest {
    /// Operator label.
    #[serde(default)]
    pub label: String,
    /// Archive scope; defaults to a full backup.
    #[serde(default)]
    pub kind: Option<BackupKind>,
}

/// `POST /api/backups`
pub async fn create_backup(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Json(body): Json<CreateBackupRequest>,
) -> ApiResult<(StatusCode, Json<BackupRecord>)> {
    caller.require(PermissionTier::Admin)?;
    let record = state
        .backups
        .create_backup(&body.label, body.kind.unwrap_or(BackupKind::Full))?;
    Ok((StatusCode::ACCEPTED, Json(record)))
}

/// `DELETE /api/backups/{id}`
pub async fn delete_backup(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    caller.require(PermissionTier::Owner)?;
    state.backups.delete_backup(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/backups/{id}/restore`
pub async fn restore_backup(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    caller.require(PermissionTier::Owner)?;
    if state.supervisor.is_running() {
        return Err(
            AppError::Precondition("stop the server before restoring a backup".into()).into(),
        );
    }
    info!(subject = %caller.subject, id = %id, "restore requested");
    state.backups.restore_backup(&id).await?;
    Ok(Json(serde_json::json!({ "restored": id })))
}

/// `GET /api/backups/{id}/download`
pub async fn download_backup(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    caller.require(PermissionTier::Admin)?;
    let path = state.backups.archive_path(&id).await?;
    let file = tokio::fs::File::open(&path).await.map_err(AppError::from)?;
    let len = file.metadata().await.map_err(AppError::from)?.len();

    let headers = [
        (header::CONTENT_TYPE, "application/octet-stream".to_owned()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"backup-{}.tar.zst\"", id.trim()),
        ),
        (header::CONTENT_LENGTH, len.to_string()),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))))
}

// ── Files ────────────────────────────────────────────────────────────────────

/// Query for path-addressed file routes.
#[derive(Debug, Deserialize)]
pub struct PathQuery {
    /// Root-relative path; empty means the root.
    #[serde(default)]
    pub path: String,
}

/// `GET /api/files`
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Query(query): Query<PathQuery>,
) -> ApiResult<Json<Vec<FileEntry>>> {
    caller.require(PermissionTier::Admin)?;
    Ok(Json(state.sandbox.list_directory(&query.path).await?))
}

/// `DELETE /api/files`
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Query(query): Query<PathQuery>,
) -> ApiResult<StatusCode> {
    caller.require(PermissionTier::Admin)?;
    info!(subject = %caller.subject, path = %query.path, "delete requested");
    state.sandbox.delete_file(&query.path).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/files/content`
pub async fn read_file(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Query(query): Query<PathQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    caller.require(PermissionTier::Admin)?;
    let content = state.sandbox.read_file(&query.path).await?;
    Ok(Json(
        serde_json::json!({ "path": query.path, "content": content }),
    ))
}

/// Body for `PUT /api/files/content`.
#[derive(Debug, Deserialize)]
pub struct WriteFileRequest {
    /// Root-relative path.
    pub path: String,
    /// New file content.
    pub content: String,
}

/// `PUT /api/files/content`
pub async fn write_file(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Json(body): Json<WriteFileRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    caller.require(PermissionTier::Admin)?;
    info!(subject = %caller.subject, path = %body.path, "write requested");
    let bytes = state.sandbox.write_file(&body.path, body.content).await?;
    Ok(Json(
        serde_json::json!({ "path": body.path, "bytes": bytes }),
    ))
}
