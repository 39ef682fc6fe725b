//! Error types shared across the agent.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
///
/// Every variant carries a human-readable reason; the HTTP boundary maps
/// variants to status codes in [`crate::api::error`].
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Persistence failure when interacting with `SQLite`.
    Db(String),
    /// RCON connection, handshake, or command failure.
    Rcon(String),
    /// Worker process spawn or signal failure.
    Process(String),
    /// Backup archive build, restore, or lookup failure.
    Backup(String),
    /// File system path failed validation against the server root.
    PathViolation(String),
    /// Path or command rejected by the access policy.
    Denied(String),
    /// Payload exceeds a configured size limit.
    TooLarge(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// Caller credentials are missing, malformed, or expired.
    Unauthorized(String),
    /// Caller is authenticated but lacks the permission tier.
    Forbidden(String),
    /// Operation is not valid in the current state (e.g. stop while stopped).
    Precondition(String),
    /// Caller input failed validation.
    InvalidInput(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Rcon(msg) => write!(f, "rcon: {msg}"),
            Self::Process(msg) => write!(f, "process: {msg}"),
            Self::Backup(msg) => write!(f, "backup: {msg}"),
            Self::PathViolation(msg) => write!(f, "path violation: {msg}"),
            Self::Denied(msg) => write!(f, "denied: {msg}"),
            Self::TooLarge(msg) => write!(f, "too large: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            Self::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            Self::Precondition(msg) => write!(f, "precondition failed: {msg}"),
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
