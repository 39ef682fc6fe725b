//! Request authentication extractor.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, Uri};

use super::error::ApiError;
use super::AppState;
use crate::auth::Caller;
use crate::AppError;

/// The verified caller of a request.
///
/// Credentials come from `Authorization: Bearer …` or, for clients that
/// cannot set headers (`EventSource`), a `token` query parameter.
#[derive(Debug, Clone)]
pub struct AuthenticatedCaller(pub Caller);

impl FromRequestParts<Arc<AppState>> for AuthenticatedCaller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .or_else(|| query_param(&parts.uri, "token"))
            .ok_or_else(|| AppError::Unauthorized("missing credentials".into()))?;
        let caller = state.verifier.verify(&token).await?;
        Ok(Self(caller))
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
}

/// Extract a query parameter without URL-decoding.
///
/// Tokens are base64url plus `.`, so no decoding is needed. Returns `None`
/// when the parameter is absent or empty.
fn query_param(uri: &Uri, name: &str) -> Option<String> {
    uri.query().and_then(|q| {
        q.split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.to_owned())
            .filter(|v| !v.is_empty())
    })
}
