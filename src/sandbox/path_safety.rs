//! Path normalization and symlink-escape detection.
//!
//! Every sandboxed file operation resolves its root-relative path here
//! first. Paths are normalized lexically, `..` may not climb above the
//! root, and the deepest existing part of every path is canonicalized so
//! a symlink inside the root cannot point outside it.

use std::path::{Component, Path, PathBuf};

use crate::{AppError, Result};

/// Resolve `candidate` against the canonical `root`.
///
/// A leading `/` is treated as root-relative, `.` segments are dropped and
/// `..` segments pop the previous segment. The nearest existing ancestor of
/// the result (the target itself when it exists) is canonicalized, so a
/// symlinked directory cannot carry a new file outside the root. Returns the
/// absolute path.
///
/// # Errors
///
/// Returns `AppError::PathViolation` if:
/// - A `..` segment would climb above the root.
/// - The candidate carries a platform prefix (e.g. `C:`).
/// - The resolved path does not start with the root.
/// - The target or its nearest existing ancestor is a link that escapes
///   the root, or a dangling link.
pub fn resolve_within(root: &Path, candidate: impl AsRef<Path>) -> Result<PathBuf> {
    let candidate = candidate.as_ref();
    let absolute = root.join(normalize(candidate)?);

    if !absolute.starts_with(root) {
        return Err(AppError::PathViolation(format!(
            "'{}' resolves outside the server root",
            candidate.display()
        )));
    }

    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    while std::fs::symlink_metadata(existing).is_err() {
        let Some(name) = existing.file_name() else {
            break;
        };
        missing.push(name.to_owned());
        match existing.parent() {
            Some(parent) => existing = parent,
            None => break,
        }
    }

    let canonical = existing.canonicalize().map_err(|err| {
        AppError::PathViolation(format!("cannot resolve '{}': {err}", candidate.display()))
    })?;
    if !canonical.starts_with(root) {
        return Err(AppError::PathViolation(format!(
            "'{}' is a link that escapes the server root",
            candidate.display()
        )));
    }

    Ok(missing
        .into_iter()
        .rev()
        .fold(canonical, |path, name| path.join(name)))
}

/// Resolve `candidate` like [`resolve_within`] without following its final
/// component, so the result names a link itself rather than its target.
///
/// # Errors
///
/// Same as [`resolve_within`], applied to the parent directory.
pub fn resolve_entry(root: &Path, candidate: impl AsRef<Path>) -> Result<PathBuf> {
    let candidate = candidate.as_ref();
    let normalized = normalize(candidate)?;
    match (normalized.parent(), normalized.file_name()) {
        (Some(parent), Some(name)) => Ok(resolve_within(root, parent)?.join(name)),
        _ => resolve_within(root, &normalized),
    }
}

fn normalize(candidate: &Path) -> Result<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(AppError::PathViolation(format!(
                        "'{}' escapes the server root",
                        candidate.display()
                    )));
                }
            }
            Component::CurDir | Component::RootDir => {}
            Component::Prefix(_) => {
                return Err(AppError::PathViolation(format!(
                    "'{}' is not a root-relative path",
                    candidate.display()
                )));
            }
            Component::Normal(part) => normalized.push(part),
        }
    }
    Ok(normalized)
}

/// Render `absolute` relative to `root` with `/` separators.
///
/// Returns an empty string for the root itself.
#[must_use]
pub fn to_relative(root: &Path, absolute: &Path) -> String {
    absolute
        .strip_prefix(root)
        .map(|rel| {
            rel.components()
                .filter_map(|component| match component {
                    Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default()
}
