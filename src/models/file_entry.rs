//! Directory listing entry.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One entry of a sandboxed directory listing.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct FileEntry {
    /// Entry name (final path segment).
    pub name: String,
    /// Path relative to the sandbox root, `/`-separated.
    pub path: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Last modification time, when the platform reports one.
    pub modified: Option<DateTime<Utc>>,
}
