//! Rate limiting for authentication endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down credential
//! stuffing against login and signup.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};

use crate::auth::extract_client_ip;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Bucket key for requests whose client IP cannot be determined.
const UNKNOWN_CLIENT: &str = "unknown";

/// Quotas for the limited endpoints. Zero values are raised to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    /// Login attempts allowed back to back
    pub login_burst: u32,
    /// Sustained login attempts per minute
    pub login_per_minute: u32,
    /// Signups per minute
    pub signup_per_minute: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            login_burst: 5,
            login_per_minute: 10,
            signup_per_minute: 3,
        }
    }
}

fn non_zero(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value).unwrap_or(NonZeroU32::MIN)
}

/// Rate limiters shared by the auth routes.
#[derive(Clone)]
pub struct RateLimiters {
    pub login: Arc<IpLimiter>,
    pub signup: Arc<IpLimiter>,
    /// Key buckets on `X-Forwarded-For` instead of the socket address
    pub trust_forwarded_for: bool,
}

impl RateLimiters {
    pub fn new(settings: RateLimitSettings, trust_forwarded_for: bool) -> Self {
        Self {
            login: Arc::new(RateLimiter::keyed(
                Quota::per_minute(non_zero(settings.login_per_minute))
                    .allow_burst(non_zero(settings.login_burst)),
            )),
            signup: Arc::new(RateLimiter::keyed(Quota::per_minute(non_zero(
                settings.signup_per_minute,
            )))),
            trust_forwarded_for,
        }
    }

    fn client_key(&self, request: &Request) -> String {
        extract_client_ip(request, self.trust_forwarded_for)
            .unwrap_or_else(|_| UNKNOWN_CLIENT.to_string())
    }
}

/// Middleware for rate limiting login.
pub async fn rate_limit_login(
    State(limiters): State<RateLimiters>,
    request: Request,
    next: Next,
) -> Response {
    let key = limiters.client_key(&request);
    match limiters.login.check_key(&key) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            tracing::warn!(client = %key, "Login rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many authentication attempts. Please wait before trying again.",
            )
                .into_response()
        }
    }
}

/// Middleware for rate limiting signup.
pub async fn rate_limit_signup(
    State(limiters): State<RateLimiters>,
    request: Request,
    next: Next,
) -> Response {
    let key = limiters.client_key(&request);
    match limiters.signup.check_key(&key) {
        Ok(_) => next.run(request).await,
        Err(_) => (
            StatusCode::TOO_MANY_REQUESTS,
            "Too many signup attempts. Please wait before trying again.",
        )
            .into_response(),
    }
}
