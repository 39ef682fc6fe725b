//! Caller permission tiers.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::AppError;

/// Ordered permission tier: `Moderator < Admin < Owner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionTier {
    /// Chat moderation and read-only status.
    Moderator,
    /// Lifecycle, backups, and file access.
    Admin,
    /// Destructive operations such as restore and backup deletion.
    Owner,
}

impl PermissionTier {
    /// Whether this tier satisfies `required`.
    #[must_use]
    pub fn allows(self, required: Self) -> bool {
        self >= required
    }

    /// Lowercase wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Moderator => "moderator",
            Self::Admin => "admin",
            Self::Owner => "owner",
        }
    }
}

impl Display for PermissionTier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionTier {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "moderator" => Ok(Self::Moderator),
            "admin" => Ok(Self::Admin),
            "owner" => Ok(Self::Owner),
            other => Err(AppError::InvalidInput(format!(
                "unknown permission tier '{other}'"
            ))),
        }
    }
}
