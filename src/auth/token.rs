//! HMAC-SHA256 signed access tokens.
//!
//! Format: `base64url(claims json) "." base64url(hmac)`, no padding.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::{Caller, CredentialVerifier};
use crate::models::permission::PermissionTier;
use crate::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    tier: PermissionTier,
    exp: i64,
}

/// Issues and verifies signed tokens with a shared secret.
#[derive(Clone)]
pub struct SignedTokenVerifier {
    secret: Vec<u8>,
}

impl std::fmt::Debug for SignedTokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedTokenVerifier").finish_non_exhaustive()
    }
}

impl SignedTokenVerifier {
    /// Create a verifier for `secret`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the secret is empty.
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(AppError::Config("token secret must not be empty".into()));
        }
        Ok(Self { secret })
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|err| AppError::Config(format!("invalid token secret: {err}")))
    }

    /// Mint a token for `subject` at `tier`, valid for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the claims cannot be encoded.
    pub fn issue(&self, subject: &str, tier: PermissionTier, ttl: Duration) -> Result<String> {
        let ttl = i64::try_from(ttl.as_secs())
            .map_err(|_| AppError::InvalidInput("token lifetime too long".into()))?;
        let claims = Claims {
            sub: subject.to_owned(),
            tier,
            exp: Utc::now().timestamp().saturating_add(ttl),
        };
        let payload = serde_json::to_vec(&claims)
            .map_err(|err| AppError::Config(format!("cannot encode token claims: {err}")))?;
        let payload = URL_SAFE_NO_PAD.encode(payload);

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{payload}.{signature}"))
    }

    /// Check signature and expiry.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unauthorized` for malformed, forged, or expired
    /// tokens.
    pub fn verify_token(&self, token: &str) -> Result<Caller> {
        let (payload, signature) = token
            .trim()
            .split_once('.')
            .ok_or_else(|| AppError::Unauthorized("malformed token".into()))?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AppError::Unauthorized("malformed token signature".into()))?;
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AppError::Unauthorized("invalid token signature".into()))?;

        let raw = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| AppError::Unauthorized("malformed token payload".into()))?;
        let claims: Claims = serde_json::from_slice(&raw)
            .map_err(|_| AppError::Unauthorized("malformed token claims".into()))?;

        if claims.exp <= Utc::now().timestamp() {
            return Err(AppError::Unauthorized("token expired".into()));
        }
        if claims.sub.trim().is_empty() {
            return Err(AppError::Unauthorized("token has no subject".into()));
        }

        Ok(Caller {
            subject: claims.sub,
            tier: claims.tier,
        })
    }
}

impl CredentialVerifier for SignedTokenVerifier {
    fn verify<'a>(
        &'a self,
        credential: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Caller>> + Send + 'a>> {
        Box::pin(async move { self.verify_token(credential) })
    }
}
