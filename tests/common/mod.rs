#![allow(dead_code)]

use std::sync::Arc;

use auraflow::{
    ServerConfig,
    audit::MemoryAuditSink,
    auth::CookieSettings,
    cleanup::DEFAULT_CLEANUP_INTERVAL,
    create_app,
    db::{Database, User},
    jwt::JwtConfig,
    rate_limit::RateLimitSettings,
};
use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use tower::ServiceExt;

pub const ACCESS_SECRET: &[u8] = b"test-access-secret-0123456789abcdef";
pub const REFRESH_SECRET: &[u8] = b"test-refresh-secret-0123456789abcdef";
pub const PASSWORD: &str = "correct horse battery";

/// Limits high enough that ordinary tests never trip them.
pub const RELAXED_LIMITS: RateLimitSettings = RateLimitSettings {
    login_burst: 1000,
    login_per_minute: 1000,
    signup_per_minute: 1000,
};

pub struct TestApp {
    pub app: Router,
    pub db: Database,
    pub jwt: JwtConfig,
    pub audit: MemoryAuditSink,
}

pub struct TestOptions {
    pub no_signup: bool,
    pub rate_limits: RateLimitSettings,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            no_signup: false,
            rate_limits: RELAXED_LIMITS,
        }
    }
}

pub async fn test_app() -> TestApp {
    test_app_with(TestOptions::default()).await
}

pub async fn test_app_with(options: TestOptions) -> TestApp {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database")
        .with_hash_cost(4);
    let jwt = JwtConfig::new(ACCESS_SECRET, REFRESH_SECRET);
    let audit = MemoryAuditSink::new();

    let config = ServerConfig {
        db: db.clone(),
        jwt: jwt.clone(),
        cookies: CookieSettings::default(),
        no_signup: options.no_signup,
        trust_forwarded_for: false,
        rate_limits: options.rate_limits,
        audit: Arc::new(audit.clone()),
        cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
    };

    TestApp {
        app: create_app(&config),
        db,
        jwt,
        audit,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed")
    }

    /// Create a user directly in the database.
    pub async fn create_user(&self, email: &str) -> User {
        self.db
            .users()
            .create(email, "Test User", PASSWORD, None)
            .await
            .expect("Failed to create user")
    }

    /// Log in through the API and return (access_token, refresh_token).
    pub async fn login(&self, email: &str) -> (String, String) {
        let response = self
            .send(post_json(
                "/api/auth/login",
                serde_json::json!({ "email": email, "password": PASSWORD }),
            ))
            .await;
        assert_eq!(response.status(), 200, "login failed");

        let cookies = set_cookies(&response);
        (
            cookie_value(&cookies, "access_token").expect("No access cookie"),
            cookie_value(&cookies, "refresh_token").expect("No refresh cookie"),
        )
    }
}

pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn post_with_cookie(uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

pub fn refresh_cookie(token: &str) -> String {
    format!("refresh_token={}", token)
}

pub fn get_with_bearer(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

/// Extract Set-Cookie headers from response
pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// Value of a cookie that is being set (not cleared).
pub fn cookie_value(cookies: &[String], name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    cookies
        .iter()
        .filter(|c| !c.contains("Max-Age=0"))
        .find_map(|c| c.strip_prefix(prefix.as_str()))
        .and_then(|rest| rest.split(';').next())
        .map(|v| v.to_string())
}

/// Check if cookies contain a cookie being cleared (Max-Age=0)
pub fn has_cleared_cookie(cookies: &[String], name: &str) -> bool {
    let prefix = format!("{}=;", name);
    cookies
        .iter()
        .any(|c| c.starts_with(&prefix) && c.contains("Max-Age=0"))
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}
