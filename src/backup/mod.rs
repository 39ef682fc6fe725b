//! Point-in-time backups of the server root.
//!
//! Archives are `tar` streams compressed with zstd, written to the state
//! directory as `<id>.tar.zst`. Metadata for finished backups lives in
//! `SQLite`; in-flight builds are tracked in memory.

pub mod archive;
pub mod manager;

pub use manager::BackupManager;
