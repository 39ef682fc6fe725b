//! Backup record model.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppError;

/// Archive file extension.
pub const ARCHIVE_EXTENSION: &str = "tar.zst";

/// What a backup archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackupKind {
    /// The whole server root.
    Full,
    /// Only the configured world directories.
    DataOnly,
}

impl BackupKind {
    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::DataOnly => "data-only",
        }
    }
}

impl Display for BackupKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(Self::Full),
            "data-only" => Ok(Self::DataOnly),
            other => Err(AppError::InvalidInput(format!("unknown backup kind '{other}'"))),
        }
    }
}

/// Backup lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    /// Archive build in progress.
    Creating,
    /// Archive complete and restorable.
    Ready,
    /// Archive build failed.
    Failed,
}

impl BackupStatus {
    /// Whether the state machine permits moving to `next`.
    ///
    /// `Creating` moves to `Ready` or `Failed`; both are terminal.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Creating, Self::Ready | Self::Failed)
        )
    }

    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for BackupStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "creating" => Ok(Self::Creating),
            "ready" => Ok(Self::Ready),
            "failed" => Ok(Self::Failed),
            other => Err(AppError::InvalidInput(format!(
                "unknown backup status '{other}'"
            ))),
        }
    }
}

/// One backup, in flight or finalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Unique identifier (UUID v4).
    pub id: String,
    /// Archive file name inside the backup directory.
    pub filename: String,
    /// Operator-supplied label.
    pub label: String,
    /// What was archived.
    pub kind: BackupKind,
    /// Archive size; set once ready.
    pub size_bytes: Option<u64>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Lifecycle status.
    pub status: BackupStatus,
    /// Failure reason when `status` is `failed`.
    pub error: Option<String>,
}

impl BackupRecord {
    /// Create a new record in the `creating` state.
    #[must_use]
    pub fn new(label: String, kind: BackupKind) -> Self {
        let id = Uuid::new_v4().to_string();
        Self {
            filename: format!("{id}.{ARCHIVE_EXTENSION}"),
            id,
            label,
            kind,
            size_bytes: None,
            created_at: Utc::now(),
            status: BackupStatus::Creating,
            error: None,
        }
    }

    /// Finalize as `ready` with the archive size.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Precondition` unless the record is `creating`.
    pub fn mark_ready(&mut self, size_bytes: u64) -> Result<(), AppError> {
        self.transition(BackupStatus::Ready)?;
        self.size_bytes = Some(size_bytes);
        self.error = None;
        Ok(())
    }

    /// Finalize as `failed` with the reason.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Precondition` unless the record is `creating`.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<(), AppError> {
        self.transition(BackupStatus::Failed)?;
        self.size_bytes = None;
        self.error = Some(reason.into());
        Ok(())
    }

    fn transition(&mut self, next: BackupStatus) -> Result<(), AppError> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::Precondition(format!(
                "backup {} cannot move from {} to {}",
                self.id,
                self.status.as_str(),
                next.as_str()
            )));
        }
        self.status = next;
        Ok(())
    }
}

/// Archive storage consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StorageUsage {
    /// Bytes used by archives on disk.
    pub used_bytes: u64,
    /// Configured quota.
    pub quota_bytes: u64,
    /// Number of backup records.
    pub count: usize,
}
