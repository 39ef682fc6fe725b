//! Sandbox boundary for file access under the server root.
//!
//! [`Sandbox`] is the single chokepoint for browse/read/write/delete:
//! every operation resolves its path through [`Sandbox::resolve_path`] and
//! checks [`Sandbox::is_denied`] before touching the filesystem.

mod files;
pub mod path_safety;

use std::path::{Path, PathBuf};

use crate::config::FilesConfig;
use crate::models::access::AccessPolicy;
use crate::{AppError, Result};

/// Confines file access to one directory subtree plus a denylist.
#[derive(Debug, Clone)]
pub struct Sandbox {
    policy: AccessPolicy,
    max_read_bytes: u64,
}

impl Sandbox {
    /// Create a sandbox rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the root cannot be canonicalized.
    pub fn new(root: impl AsRef<Path>, files: &FilesConfig) -> Result<Self> {
        let root = root
            .as_ref()
            .canonicalize()
            .map_err(|err| AppError::Config(format!("sandbox root invalid: {err}")))?;
        Ok(Self {
            policy: AccessPolicy::from_config(root, files),
            max_read_bytes: files.max_read_bytes,
        })
    }

    /// Canonical sandbox root.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.policy.root()
    }

    /// Largest file [`Sandbox::read_file`] will load.
    #[must_use]
    pub fn max_read_bytes(&self) -> u64 {
        self.max_read_bytes
    }

    /// Resolve a root-relative path to an absolute path inside the root.
    ///
    /// # Errors
    ///
    /// Returns `AppError::PathViolation` if the path escapes the root.
    pub fn resolve_path(&self, relative: impl AsRef<Path>) -> Result<PathBuf> {
        path_safety::resolve_within(self.policy.root(), relative)
    }

    /// Whether `relative` matches the denylist.
    #[must_use]
    pub fn is_denied(&self, relative: impl AsRef<Path>) -> bool {
        self.policy.is_denied(relative)
    }

    /// Resolve and deny-check in one step.
    fn guard(&self, relative: &str) -> Result<PathBuf> {
        let absolute = self.resolve_path(relative)?;
        self.check_denied(relative, absolute)
    }

    /// Like [`Sandbox::guard`], but a final symlink is not followed.
    fn guard_entry(&self, relative: &str) -> Result<PathBuf> {
        let absolute = path_safety::resolve_entry(self.policy.root(), relative)?;
        self.check_denied(relative, absolute)
    }

    fn check_denied(&self, relative: &str, absolute: PathBuf) -> Result<PathBuf> {
        let normalized = path_safety::to_relative(self.root(), &absolute);
        if self.is_denied(relative) || self.is_denied(&normalized) {
            return Err(AppError::Denied(format!(
                "access to '{relative}' is not allowed"
            )));
        }
        Ok(absolute)
    }
}
