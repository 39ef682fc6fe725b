//! Tar + zstd archive build and extraction.
//!
//! Everything here is blocking I/O; callers run it on
//! `tokio::task::spawn_blocking`.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::models::backup::BackupKind;
use crate::{AppError, Result};

/// zstd compression level for archives.
pub const COMPRESSION_LEVEL: i32 = 3;

/// Build `dest` from `root`, returning the archive size in bytes.
///
/// A full backup archives the whole root. A data-only backup archives the
/// `data_dirs` that exist under the root and fails when none do.
///
/// # Errors
///
/// Returns `AppError::Backup` if no data directory exists or any read,
/// compress, or write step fails.
pub fn build(root: &Path, kind: BackupKind, data_dirs: &[String], dest: &Path) -> Result<u64> {
    let dir = dest.parent().ok_or_else(|| {
        AppError::Backup(format!("archive path {} has no parent", dest.display()))
    })?;
    // The temp file is removed on drop, so a failed build leaves nothing.
    let staging = NamedTempFile::new_in(dir)
        .map_err(|err| AppError::Backup(format!("cannot stage archive in {}: {err}", dir.display())))?;
    let encoder = zstd::stream::write::Encoder::new(BufWriter::new(staging), COMPRESSION_LEVEL)
        .map_err(|err| AppError::Backup(format!("zstd init failed: {err}")))?;

    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    match kind {
        BackupKind::Full => {
            builder
                .append_dir_all(".", root)
                .map_err(|err| AppError::Backup(format!("failed to archive server root: {err}")))?;
        }
        BackupKind::DataOnly => {
            let present: Vec<&String> = data_dirs
                .iter()
                .filter(|dir| root.join(dir).is_dir())
                .collect();
            if present.is_empty() {
                return Err(AppError::Backup(format!(
                    "none of the data directories exist: {}",
                    data_dirs.join(", ")
                )));
            }
            for dir in present {
                debug!(dir = %dir, "archiving data directory");
                builder
                    .append_dir_all(dir, root.join(dir))
                    .map_err(|err| AppError::Backup(format!("failed to archive {dir}: {err}")))?;
            }
        }
    }

    let encoder = builder
        .into_inner()
        .map_err(|err| AppError::Backup(format!("failed to finish tar stream: {err}")))?;
    let writer = encoder
        .finish()
        .map_err(|err| AppError::Backup(format!("failed to finish zstd stream: {err}")))?;
    let staging = writer
        .into_inner()
        .map_err(|err| AppError::Backup(format!("failed to flush archive: {}", err.error())))?;
    staging
        .as_file()
        .sync_all()
        .map_err(|err| AppError::Backup(format!("failed to sync archive: {err}")))?;

    let size = staging
        .as_file()
        .metadata()
        .map_err(|err| AppError::Backup(format!("failed to stat archive: {err}")))?
        .len();
    staging
        .persist(dest)
        .map_err(|err| AppError::Backup(format!("cannot publish {}: {}", dest.display(), err.error)))?;
    Ok(size)
}

/// Extract `archive` over `root`, overwriting existing files.
///
/// Entries that would land outside `root` are refused by `tar`.
///
/// # Errors
///
/// Returns `AppError::Backup` if the archive cannot be read or unpacked.
pub fn extract(archive: &Path, root: &Path) -> Result<()> {
    let file = File::open(archive)
        .map_err(|err| AppError::Backup(format!("cannot open {}: {err}", archive.display())))?;
    let decoder = zstd::stream::read::Decoder::new(file)
        .map_err(|err| AppError::Backup(format!("zstd init failed: {err}")))?;

    let mut unpacker = tar::Archive::new(decoder);
    unpacker.set_overwrite(true);
    unpacker.set_preserve_permissions(true);
    unpacker
        .unpack(root)
        .map_err(|err| AppError::Backup(format!("failed to extract archive: {err}")))
}
