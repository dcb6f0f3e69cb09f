//! Cookie and header parsing/formatting for authentication.

use axum::http::{HeaderMap, header};

use crate::session::SessionTokens;

/// Cookie name for the access token (short-lived).
pub const ACCESS_COOKIE_NAME: &str = "access_token";

/// Cookie name for the refresh token (long-lived).
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// `SameSite` attribute for auth cookies.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    #[default]
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Attributes shared by every auth cookie.
///
/// Browsers only drop a cookie when the clearing `Set-Cookie` carries the same
/// name, path and flags, so setting and clearing go through one formatter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieSettings {
    /// Add the `Secure` flag (production, HTTPS)
    pub secure: bool,
    pub same_site: SameSite,
    pub path: String,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            secure: false,
            same_site: SameSite::Strict,
            path: "/".to_string(),
        }
    }
}

impl CookieSettings {
    fn format(&self, name: &str, value: &str, max_age: u64) -> String {
        let secure = if self.secure { "; Secure" } else { "" };
        format!(
            "{}={}; HttpOnly; SameSite={}; Path={}; Max-Age={}{}",
            name,
            value,
            self.same_site.as_str(),
            self.path,
            max_age,
            secure
        )
    }

    pub fn access_cookie(&self, token: &str, max_age: u64) -> String {
        self.format(ACCESS_COOKIE_NAME, token, max_age)
    }

    pub fn refresh_cookie(&self, token: &str, max_age: u64) -> String {
        self.format(REFRESH_COOKIE_NAME, token, max_age)
    }

    pub fn clear_access_cookie(&self) -> String {
        self.format(ACCESS_COOKIE_NAME, "", 0)
    }

    pub fn clear_refresh_cookie(&self) -> String {
        self.format(REFRESH_COOKIE_NAME, "", 0)
    }

    /// `Set-Cookie` values for both cookies with `Max-Age=0`.
    pub fn cleared(&self) -> [String; 2] {
        [self.clear_access_cookie(), self.clear_refresh_cookie()]
    }

    /// `Set-Cookie` values for whatever tokens a session operation issued.
    /// The refresh cookie is only rebound when a new refresh token exists.
    pub fn bind(&self, tokens: &SessionTokens) -> Vec<String> {
        let mut cookies = vec![self.access_cookie(&tokens.access.token, tokens.access.duration)];
        if let Some(refresh) = &tokens.refresh {
            cookies.push(self.refresh_cookie(&refresh.token, refresh.duration));
        }
        cookies
    }
}

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

/// State of the `Authorization` header.
#[derive(Debug, PartialEq, Eq)]
pub enum BearerToken<'a> {
    Missing,
    Malformed,
    Present(&'a str),
}

/// Parse `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> BearerToken<'_> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return BearerToken::Missing;
    };
    let Ok(value) = value.to_str() else {
        return BearerToken::Malformed;
    };
    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => {
            let token = token.trim();
            if token.is_empty() || token.contains(' ') {
                BearerToken::Malformed
            } else {
                BearerToken::Present(token)
            }
        }
        _ => BearerToken::Malformed,
    }
}
