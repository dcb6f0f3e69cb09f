//! Authentication error types.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use super::cookie::CookieSettings;
use crate::jwt::TokenError;
use crate::session::{Outcome, SessionError};

/// Internal auth error kind used by the core authentication logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    NotAuthenticated,
    InvalidToken,
    TokenExpired,
    InvalidCredentials,
    SessionNotFound,
    Internal,
    Unavailable,
}

/// API authentication errors. Returns JSON with a fixed message and, for
/// errors that require logging in again, clears both auth cookies.
#[derive(Debug)]
pub struct ApiAuthError {
    kind: AuthErrorKind,
    clear_cookies: Option<[String; 2]>,
}

impl ApiAuthError {
    pub fn new(kind: AuthErrorKind) -> Self {
        Self {
            kind,
            clear_cookies: None,
        }
    }

    /// Translate a session failure. Re-authenticate outcomes clear the cookies;
    /// retry-later outcomes leave them untouched.
    pub fn from_session(err: &SessionError, cookies: &CookieSettings) -> Self {
        let kind = match err {
            SessionError::AuthenticationError => AuthErrorKind::NotAuthenticated,
            SessionError::InvalidCredentials => AuthErrorKind::InvalidCredentials,
            SessionError::InvalidRefreshToken(_) => AuthErrorKind::InvalidToken,
            SessionError::SessionNotFound => AuthErrorKind::SessionNotFound,
            SessionError::Token(e) => {
                tracing::error!(error = %e, "Failed to mint token");
                AuthErrorKind::Internal
            }
            SessionError::Persistence(e) => {
                tracing::error!(error = %e, "Session store unavailable");
                AuthErrorKind::Unavailable
            }
        };

        let error = Self::new(kind);
        match err.outcome() {
            Outcome::Reauthenticate => error.clearing(cookies),
            Outcome::RetryLater => error,
        }
    }

    /// Attach `Set-Cookie` headers that clear both auth cookies.
    pub fn clearing(mut self, cookies: &CookieSettings) -> Self {
        self.clear_cookies = Some(cookies.cleared());
        self
    }

    pub fn kind(&self) -> AuthErrorKind {
        self.kind
    }

    fn status_code(&self) -> StatusCode {
        match self.kind {
            AuthErrorKind::NotAuthenticated
            | AuthErrorKind::InvalidToken
            | AuthErrorKind::TokenExpired
            | AuthErrorKind::InvalidCredentials
            | AuthErrorKind::SessionNotFound => StatusCode::UNAUTHORIZED,
            AuthErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            AuthErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn message(&self) -> &'static str {
        match self.kind {
            AuthErrorKind::NotAuthenticated => "Not authenticated",
            AuthErrorKind::InvalidToken => "Invalid token",
            AuthErrorKind::TokenExpired => "Token expired",
            AuthErrorKind::InvalidCredentials => "Invalid email or password",
            AuthErrorKind::SessionNotFound => "Session is no longer valid",
            AuthErrorKind::Internal => "Internal error",
            AuthErrorKind::Unavailable => "Service temporarily unavailable, retry later",
        }
    }
}

impl From<TokenError> for AuthErrorKind {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => AuthErrorKind::TokenExpired,
            _ => AuthErrorKind::InvalidToken,
        }
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        let mut response = (
            self.status_code(),
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response();

        if let Some(cookies) = self.clear_cookies {
            let headers = response.headers_mut();
            for cookie in cookies {
                if let Ok(value) = HeaderValue::from_str(&cookie) {
                    headers.append(header::SET_COOKIE, value);
                }
            }
        }

        response
    }
}
