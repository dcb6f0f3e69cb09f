//! Axum extractors for authentication.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::cookie::{ACCESS_COOKIE_NAME, BearerToken, bearer_token, get_cookie};
use super::errors::{ApiAuthError, AuthErrorKind};
use super::state::HasAuthState;
use crate::jwt::Claims;

/// Authenticated user information extracted from an access token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// JWT claims from the access token
    pub claims: Claims,
}

impl AuthenticatedUser {
    pub fn user_id(&self) -> &str {
        &self.claims.sub
    }

    pub fn role(&self) -> Option<&str> {
        self.claims.role.as_deref()
    }
}

/// Find the access token: `Authorization: Bearer` first, then the access cookie.
/// A present but malformed header is rejected rather than skipped.
fn access_token(parts: &Parts) -> Result<&str, AuthErrorKind> {
    match bearer_token(&parts.headers) {
        BearerToken::Present(token) => Ok(token),
        BearerToken::Malformed => Err(AuthErrorKind::InvalidToken),
        BearerToken::Missing => {
            get_cookie(&parts.headers, ACCESS_COOKIE_NAME).ok_or(AuthErrorKind::NotAuthenticated)
        }
    }
}

/// Extractor for API endpoints that require authentication.
///
/// Only the access token is checked; it is stateless, so no database access
/// happens here. An expired access token is a 401 that leaves the cookies in
/// place so the client can call the refresh endpoint.
pub struct Auth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for Auth
where
    S: HasAuthState + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = access_token(parts).map_err(ApiAuthError::new)?;

        let claims = state
            .sessions()
            .authenticate(token)
            .map_err(|e| ApiAuthError::new(AuthErrorKind::from(e)))?;

        Ok(Auth(AuthenticatedUser { claims }))
    }
}
