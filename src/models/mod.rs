//! Domain models shared across modules.

pub mod access;
pub mod backup;
pub mod file_entry;
pub mod permission;
