//! Caller authentication.
//!
//! The HTTP layer resolves every request to a [`Caller`] through a
//! [`CredentialVerifier`]. The agent ships [`SignedTokenVerifier`], which
//! accepts short-lived HMAC-signed tokens minted by `mc-warden-ctl token`
//! or by an external identity service sharing the secret.

pub mod token;

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

use crate::models::permission::PermissionTier;
use crate::Result;

pub use token::SignedTokenVerifier;

/// Authenticated identity attached to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Caller {
    /// Subject (user or service name).
    pub subject: String,
    /// Granted tier.
    pub tier: PermissionTier,
}

impl Caller {
    /// Fail unless this caller holds at least `required`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Forbidden` naming the required tier.
    pub fn require(&self, required: PermissionTier) -> Result<()> {
        if self.tier.allows(required) {
            Ok(())
        } else {
            Err(crate::AppError::Forbidden(format!(
                "{required} tier required; '{}' holds {}",
                self.subject, self.tier
            )))
        }
    }
}

/// Turns a presented credential into a [`Caller`].
pub trait CredentialVerifier: Send + Sync {
    /// Verify `credential`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unauthorized` if the credential is malformed,
    /// forged, or expired.
    fn verify<'a>(
        &'a self,
        credential: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Caller>> + Send + 'a>>;
}
