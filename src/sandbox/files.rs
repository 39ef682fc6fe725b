//! Browse, read, write, and delete operations inside the sandbox.

use std::cmp::Ordering;
use std::io::Write;
use std::path::{Component, Path};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::{path_safety, Sandbox};
use crate::models::file_entry::FileEntry;
use crate::{AppError, Result};

impl Sandbox {
    /// List a directory, directories first, then by name.
    ///
    /// Denied entries are filtered out before stat. Entries whose metadata
    /// cannot be read (for example deleted mid-listing) are skipped.
    ///
    /// # Errors
    ///
    /// Returns `AppError::PathViolation` or `AppError::Denied` if the
    /// directory itself is rejected, `AppError::NotFound` if it does not
    /// exist, and `AppError::InvalidInput` if it is not a directory.
    pub async fn list_directory(&self, relative: &str) -> Result<Vec<FileEntry>> {
        let absolute = if is_root(relative) {
            self.root().to_path_buf()
        } else {
            self.guard(relative)?
        };

        let meta = tokio::fs::metadata(&absolute)
            .await
            .map_err(|_| AppError::NotFound(format!("directory '{relative}' does not exist")))?;
        if !meta.is_dir() {
            return Err(AppError::InvalidInput(format!(
                "'{relative}' is not a directory"
            )));
        }

        let mut reader = tokio::fs::read_dir(&absolute).await?;
        let mut entries = Vec::new();

        while let Some(dirent) = reader.next_entry().await? {
            let name = dirent.file_name().to_string_lossy().into_owned();
            let child = absolute.join(&name);
            let child_rel = path_safety::to_relative(self.root(), &child);
            if self.is_denied(&child_rel) {
                continue;
            }

            let Ok(meta) = tokio::fs::metadata(&child).await else {
                debug!(path = %child_rel, "skipping entry whose metadata vanished");
                continue;
            };

            entries.push(FileEntry {
                name,
                path: child_rel,
                is_dir: meta.is_dir(),
                size: if meta.is_dir() { 0 } else { meta.len() },
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
            });
        }

        entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => a.name.cmp(&b.name),
        });

        Ok(entries)
    }

    /// Read a UTF-8 text file.
    ///
    /// # Errors
    ///
    /// Returns `AppError::TooLarge` if the file exceeds the read limit,
    /// `AppError::NotFound` if it does not exist, `AppError::InvalidInput`
    /// for directories or non-UTF-8 content, and the usual path errors.
    pub async fn read_file(&self, relative: &str) -> Result<String> {
        let absolute = self.guard(relative)?;

        let meta = tokio::fs::metadata(&absolute)
            .await
            .map_err(|_| AppError::NotFound(format!("file '{relative}' does not exist")))?;
        if meta.is_dir() {
            return Err(AppError::InvalidInput(format!("'{relative}' is a directory")));
        }
        if meta.len() > self.max_read_bytes() {
            return Err(AppError::TooLarge(format!(
                "'{relative}' is {} bytes; the read limit is {} bytes",
                meta.len(),
                self.max_read_bytes()
            )));
        }

        let bytes = tokio::fs::read(&absolute).await?;
        String::from_utf8(bytes)
            .map_err(|_| AppError::InvalidInput(format!("'{relative}' is not UTF-8 text")))
    }

    /// Write `content` to a file, creating parent directories as needed.
    ///
    /// Writes go to a temporary file in the target directory which is then
    /// renamed over the target, so readers never observe a partial file.
    ///
    /// # Errors
    ///
    /// Returns the usual path errors, `AppError::InvalidInput` when the
    /// target is a directory or the root, and `AppError::Io` on failures.
    pub async fn write_file(&self, relative: &str, content: String) -> Result<u64> {
        if is_root(relative) {
            return Err(AppError::InvalidInput("cannot write to the server root".into()));
        }
        let absolute = self.guard(relative)?;
        if absolute.is_dir() {
            return Err(AppError::InvalidInput(format!("'{relative}' is a directory")));
        }

        let written = tokio::task::spawn_blocking(move || write_atomic(&absolute, &content))
            .await
            .map_err(|err| AppError::Io(format!("write task failed: {err}")))??;

        info!(path = relative, bytes = written, "file written");
        Ok(written)
    }

    /// Delete a file, or a directory recursively.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if nothing exists at the path,
    /// `AppError::InvalidInput` for the root itself, and the usual path
    /// errors.
    pub async fn delete_file(&self, relative: &str) -> Result<()> {
        if is_root(relative) {
            return Err(AppError::InvalidInput("cannot delete the server root".into()));
        }
        // A link is removed itself, never the tree it points at.
        let absolute = self.guard_entry(relative)?;
        if absolute == self.root() {
            return Err(AppError::InvalidInput("cannot delete the server root".into()));
        }

        let meta = tokio::fs::symlink_metadata(&absolute)
            .await
            .map_err(|_| AppError::NotFound(format!("'{relative}' does not exist")))?;

        if meta.is_dir() {
            tokio::fs::remove_dir_all(&absolute).await?;
        } else {
            tokio::fs::remove_file(&absolute).await?;
        }

        info!(path = relative, dir = meta.is_dir(), "path deleted");
        Ok(())
    }
}

fn is_root(relative: &str) -> bool {
    Path::new(relative.trim())
        .components()
        .all(|component| matches!(component, Component::CurDir | Component::RootDir))
}

fn write_atomic(target: &Path, content: &str) -> Result<u64> {
    let parent = target
        .parent()
        .ok_or_else(|| AppError::Io("file path has no parent directory".into()))?;

    std::fs::create_dir_all(parent).map_err(|err| {
        AppError::Io(format!(
            "failed to create parent directories for {}: {err}",
            target.display()
        ))
    })?;

    let mut tmp = NamedTempFile::new_in(parent)
        .map_err(|err| AppError::Io(format!("failed to create temporary file: {err}")))?;

    let bytes = content.as_bytes();
    tmp.write_all(bytes)
        .map_err(|err| AppError::Io(format!("failed to write temporary file: {err}")))?;

    tmp.persist(target).map_err(|err| {
        AppError::Io(format!("failed to persist file to {}: {err}", target.display()))
    })?;

    Ok(bytes.len() as u64)
}
