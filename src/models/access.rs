//! Filesystem access policy: the sandbox root plus name denylists.

use std::path::{Component, Path, PathBuf};

use crate::config::FilesConfig;

/// File names that can never be read, written, listed, or deleted.
pub const DENIED_FILE_NAMES: &[&str] = &[".env", "session.lock", "mc-warden.toml"];

/// Directory names whose whole subtree is off limits.
pub const DENIED_DIR_NAMES: &[&str] = &[".git", ".ssh", ".mc-warden"];

/// Root boundary and denylist, immutable for the agent's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    root: PathBuf,
    denied_files: Vec<String>,
    denied_dirs: Vec<String>,
}

impl AccessPolicy {
    /// Build a policy with the built-in denylists.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            denied_files: DENIED_FILE_NAMES.iter().map(|s| (*s).to_owned()).collect(),
            denied_dirs: DENIED_DIR_NAMES.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    /// Build a policy with the built-in denylists extended from config.
    #[must_use]
    pub fn from_config(root: impl Into<PathBuf>, files: &FilesConfig) -> Self {
        let mut policy = Self::new(root);
        policy
            .denied_files
            .extend(files.extra_denied_files.iter().cloned());
        policy
            .denied_dirs
            .extend(files.extra_denied_dirs.iter().cloned());
        policy
    }

    /// Sandbox root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `relative` is denied by name.
    ///
    /// The final segment is checked against both lists (a denied directory
    /// is denied itself); every earlier segment is checked against the
    /// directory list, so denial is inherited by nested paths.
    #[must_use]
    pub fn is_denied(&self, relative: impl AsRef<Path>) -> bool {
        let segments: Vec<String> = relative
            .as_ref()
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        let Some((last, parents)) = segments.split_last() else {
            return false;
        };

        if self.denied_files.iter().any(|name| name == last)
            || self.denied_dirs.iter().any(|name| name == last)
        {
            return true;
        }

        parents
            .iter()
            .any(|segment| self.denied_dirs.iter().any(|name| name == segment))
    }
}
