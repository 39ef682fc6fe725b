//! Backup lifecycle: create in the background, list, delete, restore.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::archive;
use crate::config::BackupConfig;
use crate::models::backup::{BackupKind, BackupRecord, BackupStatus, StorageUsage, ARCHIVE_EXTENSION};
use crate::persistence::backup_repo::BackupRepo;
use crate::{AppError, Result};

/// Longest accepted backup label.
pub const MAX_LABEL_LEN: usize = 100;

struct ManagerInner {
    root: PathBuf,
    backup_dir: PathBuf,
    config: BackupConfig,
    repo: BackupRepo,
    in_flight: Mutex<HashMap<String, BackupRecord>>,
}

/// Creates and manages archives of the server root.
///
/// In-flight backups live in memory only; a record becomes durable once
/// its build finishes, either `ready` or `failed`.
#[derive(Clone)]
pub struct BackupManager {
    inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for BackupManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupManager")
            .field("root", &self.inner.root)
            .field("backup_dir", &self.inner.backup_dir)
            .finish_non_exhaustive()
    }
}

impl BackupManager {
    /// Create a manager archiving `root` into `backup_dir`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `backup_dir` cannot be created or lies
    /// inside `root`.
    pub fn new(
        root: PathBuf,
        backup_dir: PathBuf,
        config: BackupConfig,
        repo: BackupRepo,
    ) -> Result<Self> {
        std::fs::create_dir_all(&backup_dir)
            .map_err(|err| AppError::Config(format!("cannot create backup dir: {err}")))?;
        let backup_dir = backup_dir
            .canonicalize()
            .map_err(|err| AppError::Config(format!("backup dir invalid: {err}")))?;
        if backup_dir.starts_with(&root) {
            return Err(AppError::Config(
                "backup dir must not be inside the server root".into(),
            ));
        }

        Ok(Self {
            inner: Arc::new(ManagerInner {
                root,
                backup_dir,
                config,
                repo,
                in_flight: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Directory holding the archives.
    #[must_use]
    pub fn backup_dir(&self) -> &Path {
        &self.inner.backup_dir
    }

    /// Register a backup and build it in the background.
    ///
    /// Returns the `creating` record immediately; poll
    /// [`BackupManager::list_backups`] for the outcome.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` if the label is too long.
    pub fn create_backup(&self, label: &str, kind: BackupKind) -> Result<BackupRecord> {
        let label = label.trim();
        if label.chars().count() > MAX_LABEL_LEN {
            return Err(AppError::InvalidInput(format!(
                "backup label exceeds {MAX_LABEL_LEN} characters"
            )));
        }
        let label = if label.is_empty() {
            format!("{kind} backup")
        } else {
            label.to_owned()
        };

        let record = BackupRecord::new(label, kind);
        self.inner
            .registry()
            .insert(record.id.clone(), record.clone());

        info!(id = %record.id, kind = %kind, label = %record.label, "backup started");

        let span = info_span!("backup_build", id = %record.id);
        tokio::spawn(
            Arc::clone(&self.inner)
                .build(record.clone())
                .instrument(span),
        );

        Ok(record)
    }

    /// Durable records merged with in-flight ones, newest first.
    ///
    /// A durable row wins over an in-flight record with the same id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the durable query fails.
    pub async fn list_backups(&self) -> Result<Vec<BackupRecord>> {
        // Registry first: a build that finishes during the query has already
        // written its row, so it shows up in one snapshot or the other.
        let in_flight: Vec<BackupRecord> = self.inner.registry().values().cloned().collect();
        let mut records = self.inner.repo.list().await?;

        for record in in_flight {
            if !records.iter().any(|durable| durable.id == record.id) {
                records.push(record);
            }
        }

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    /// Remove a backup's archive and record.
    ///
    /// Either piece may already be missing; only when both are is the id
    /// reported as not found.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Precondition` while the backup is still being
    /// built and `AppError::NotFound` for unknown ids.
    pub async fn delete_backup(&self, id: &str) -> Result<()> {
        let id = parse_id(id)?;
        if self.inner.registry().contains_key(&id) {
            return Err(AppError::Precondition(format!(
                "backup {id} is still being created"
            )));
        }

        let filename = self
            .inner
            .repo
            .get_by_id(&id)
            .await?
            .map_or_else(|| archive_name(&id), |record| record.filename);

        let archive = self.inner.backup_dir.join(&filename);
        let removed_file = match tokio::fs::remove_file(&archive).await {
            Ok(()) => true,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => false,
            Err(err) => {
                warn!(id = %id, %err, "failed to remove backup archive");
                false
            }
        };
        let removed_row = self.inner.repo.delete(&id).await?;

        if !removed_file && !removed_row {
            return Err(AppError::NotFound(format!("backup {id} does not exist")));
        }

        info!(id = %id, removed_file, removed_row, "backup deleted");
        Ok(())
    }

    /// Extract a ready backup over the server root.
    ///
    /// The caller must make sure the server is stopped first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for unknown ids or a missing archive,
    /// `AppError::Precondition` if the backup is not `ready`, and
    /// `AppError::Backup` if extraction fails.
    pub async fn restore_backup(&self, id: &str) -> Result<()> {
        let archive = self.archive_path(id).await?;
        let root = self.inner.root.clone();

        info!(id, archive = %archive.display(), "restoring backup");
        tokio::task::spawn_blocking(move || archive::extract(&archive, &root))
            .await
            .map_err(|err| AppError::Backup(format!("restore task failed: {err}")))??;
        info!(id, "backup restored");
        Ok(())
    }

    /// Path of a ready archive, for download.
    ///
    /// # Errors
    ///
    /// Same as [`BackupManager::restore_backup`], without the extraction.
    pub async fn archive_path(&self, id: &str) -> Result<PathBuf> {
        let id = parse_id(id)?;
        if self.inner.registry().contains_key(&id) {
            return Err(AppError::Precondition(format!(
                "backup {id} is still being created"
            )));
        }

        let record = self
            .inner
            .repo
            .get_by_id(&id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("backup {id} does not exist")))?;

        if record.status != BackupStatus::Ready {
            return Err(AppError::Precondition(format!(
                "backup {id} is {} and cannot be used",
                record.status.as_str()
            )));
        }

        let path = self.inner.backup_dir.join(&record.filename);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(AppError::NotFound(format!(
                "archive for backup {id} is missing"
            )));
        }
        Ok(path)
    }

    /// Archive bytes on disk against the quota.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the backup directory cannot be read and
    /// `AppError::Db` if the record count query fails.
    pub async fn storage_usage(&self) -> Result<StorageUsage> {
        let mut used_bytes = 0u64;
        let mut reader = tokio::fs::read_dir(&self.inner.backup_dir).await?;
        while let Some(entry) = reader.next_entry().await? {
            let is_archive = entry
                .file_name()
                .to_string_lossy()
                .ends_with(ARCHIVE_EXTENSION);
            if !is_archive {
                continue;
            }
            if let Ok(meta) = entry.metadata().await {
                used_bytes += meta.len();
            }
        }

        Ok(StorageUsage {
            used_bytes,
            quota_bytes: self.inner.config.quota_bytes,
            count: self.list_backups().await?.len(),
        })
    }
}

impl ManagerInner {
    fn registry(&self) -> MutexGuard<'_, HashMap<String, BackupRecord>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Build the archive, then publish the outcome durably.
    async fn build(self: Arc<Self>, record: BackupRecord) {
        let dest = self.backup_dir.join(&record.filename);
        let root = self.root.clone();
        let data_dirs = self.config.data_dirs.clone();
        let kind = record.kind;
        let target = dest.clone();

        let outcome = tokio::task::spawn_blocking(move || {
            archive::build(&root, kind, &data_dirs, &target)
        })
        .await
        .map_err(|err| AppError::Backup(format!("archive task failed: {err}")))
        .and_then(|result| result);

        let outcome = match outcome {
            Ok(size) => {
                let mut ready = record.clone();
                match ready.mark_ready(size) {
                    Ok(()) => self.repo.upsert(&ready).await.map(|()| size),
                    Err(err) => Err(err),
                }
            }
            Err(err) => Err(err),
        };

        match outcome {
            Ok(size) => info!(size_bytes = size, "backup ready"),
            Err(err) => {
                error!(%err, "backup failed");
                if let Err(rm_err) = tokio::fs::remove_file(&dest).await {
                    if rm_err.kind() != std::io::ErrorKind::NotFound {
                        warn!(%rm_err, "failed to remove partial archive");
                    }
                }
                let mut failed = record.clone();
                match failed.mark_failed(err.to_string()) {
                    Ok(()) => {
                        if let Err(db_err) = self.repo.upsert(&failed).await {
                            warn!(%db_err, "failed to record backup failure");
                        }
                    }
                    Err(state_err) => warn!(%state_err, "backup left in its last state"),
                }
            }
        }

        self.registry().remove(&record.id);
    }
}

/// Only well-formed ids reach the filesystem.
fn parse_id(id: &str) -> Result<String> {
    Uuid::parse_str(id.trim())
        .map(|uuid| uuid.to_string())
        .map_err(|_| AppError::NotFound(format!("backup {id} does not exist")))
}

fn archive_name(id: &str) -> String {
    format!("{id}.{ARCHIVE_EXTENSION}")
}
