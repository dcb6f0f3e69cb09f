//! Bearer/cookie authentication for API routes.
//!
//! Dual-token system: short-lived access tokens (stateless) accepted from the
//! `Authorization` header or the access cookie, and long-lived refresh tokens
//! that only travel in their own http-only cookie and are backed by a session row.

mod cookie;
mod errors;
mod extractors;
mod ip;
mod state;

pub use cookie::{
    ACCESS_COOKIE_NAME, BearerToken, CookieSettings, REFRESH_COOKIE_NAME, SameSite, bearer_token,
    get_cookie,
};
pub use errors::{ApiAuthError, AuthErrorKind};
pub use extractors::{Auth, AuthenticatedUser};
pub use ip::{HasHeadersAndExtensions, extract_client_ip};
pub use state::HasAuthState;
