//! Session API endpoints.
//!
//! - POST `/register` - Create an account (absent with `--no-signup`)
//! - POST `/login` - Check credentials, start a session, set both cookies
//! - POST `/refresh` - New access token from the refresh cookie
//! - POST `/rotate` - Replace the refresh token and its session
//! - POST `/logout` - End the current session, always clears cookies
//! - POST `/logout-all` - End every session of the caller
//! - GET `/me` - Identity behind the access token
//! - GET `/sessions` - Active sessions of the caller
//! - DELETE `/sessions/{id}` - Revoke one of the caller's sessions

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    middleware,
    response::{AppendHeaders, IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};

use super::error::{ApiError, parse_session_id};
use crate::auth::{
    ApiAuthError, Auth, AuthErrorKind, CookieSettings, REFRESH_COOKIE_NAME, get_cookie,
};
use crate::db::Database;
use crate::impl_has_auth_state;
use crate::rate_limit::{RateLimiters, rate_limit_login, rate_limit_signup};
use crate::session::{SessionError, SessionManager, SessionTokens};

/// bcrypt ignores input past 72 bytes.
const MAX_PASSWORD_BYTES: usize = 72;
const MIN_PASSWORD_BYTES: usize = 8;
const MAX_EMAIL_LENGTH: usize = 254;
const MAX_NAME_LENGTH: usize = 64;

#[derive(Clone)]
pub struct AuthState {
    pub db: Database,
    pub sessions: SessionManager,
    pub cookies: CookieSettings,
    pub limiters: RateLimiters,
    pub no_signup: bool,
}

impl_has_auth_state!(AuthState);

pub fn router(state: AuthState) -> Router {
    let login_router = Router::new()
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.limiters.clone(),
            rate_limit_login,
        ));

    let session_router = Router::new()
        .route("/refresh", post(refresh))
        .route("/rotate", post(rotate))
        .route("/logout", post(logout))
        .route("/logout-all", post(logout_all))
        .route("/me", get(me))
        .route("/sessions", get(list_sessions))
        .route("/sessions/{id}", delete(revoke_session))
        .with_state(state.clone());

    let router = Router::new().merge(session_router).merge(login_router);

    if state.no_signup {
        router
    } else {
        let register_router = Router::new()
            .route("/register", post(register))
            .with_state(state.clone())
            .layer(middleware::from_fn_with_state(
                state.limiters.clone(),
                rate_limit_signup,
            ));
        router.merge(register_router)
    }
}

/// Either error family a handler here can produce.
enum HandlerError {
    Auth(ApiAuthError),
    Api(ApiError),
}

impl From<ApiAuthError> for HandlerError {
    fn from(err: ApiAuthError) -> Self {
        Self::Auth(err)
    }
}

impl From<ApiError> for HandlerError {
    fn from(err: ApiError) -> Self {
        Self::Api(err)
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        match self {
            Self::Auth(e) => e.into_response(),
            Self::Api(e) => e.into_response(),
        }
    }
}

trait SessionResultExt<T> {
    fn or_auth_err(self, cookies: &CookieSettings) -> Result<T, ApiAuthError>;
}

impl<T> SessionResultExt<T> for Result<T, SessionError> {
    fn or_auth_err(self, cookies: &CookieSettings) -> Result<T, ApiAuthError> {
        self.map_err(|e| ApiAuthError::from_session(&e, cookies))
    }
}

fn refresh_cookie<'a>(headers: &'a HeaderMap, cookies: &CookieSettings) -> Result<&'a str, ApiAuthError> {
    get_cookie(headers, REFRESH_COOKIE_NAME)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiAuthError::new(AuthErrorKind::NotAuthenticated).clearing(cookies))
}

fn set_cookies(cookies: Vec<String>) -> AppendHeaders<Vec<(axum::http::HeaderName, String)>> {
    AppendHeaders(cookies.into_iter().map(|c| (SET_COOKIE, c)).collect())
}

#[derive(Deserialize)]
struct RegisterRequest {
    email: String,
    name: String,
    password: String,
}

#[derive(Serialize)]
struct RegisterResponse {
    id: String,
    email: String,
    name: String,
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    if email.is_empty() {
        return Err(ApiError::invalid("Email cannot be empty"));
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ApiError::invalid("Email is too long"));
    }
    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace) =>
        {
            Ok(())
        }
        _ => Err(ApiError::invalid("Invalid email address")),
    }
}

fn validate_name(name: &str) -> Result<(), ApiError> {
    if name.is_empty() {
        return Err(ApiError::invalid("Name cannot be empty"));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ApiError::invalid(format!(
            "Name cannot be longer than {} characters",
            MAX_NAME_LENGTH
        )));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() < MIN_PASSWORD_BYTES {
        return Err(ApiError::invalid(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_BYTES
        )));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(ApiError::invalid(format!(
            "Password cannot be longer than {} bytes",
            MAX_PASSWORD_BYTES
        )));
    }
    Ok(())
}

async fn register(
    State(state): State<AuthState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = payload.email.trim();
    let name = payload.name.trim();
    validate_email(email)?;
    validate_name(name)?;
    validate_password(&payload.password)?;

    let user = match state.db.users().create(email, name, &payload.password, None).await {
        Err(e) if e.is_unique_violation() => return Err(ApiError::EmailTaken),
        result => result?,
    };

    tracing::info!(user_id = %user.id, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id: user.id,
            email: user.email,
            name: user.name,
        }),
    ))
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct TokenResponse {
    user_id: String,
    role: Option<String>,
    access_token: String,
    /// Seconds until the access token expires
    expires_in: u64,
}

impl From<&SessionTokens> for TokenResponse {
    fn from(tokens: &SessionTokens) -> Self {
        Self {
            user_id: tokens.user_id.clone(),
            role: tokens.role.clone(),
            access_token: tokens.access.token.clone(),
            expires_in: tokens.access.duration,
        }
    }
}

/// Bind freshly issued tokens to cookies and echo the access token.
fn session_response(state: &AuthState, tokens: &SessionTokens) -> Response {
    (
        StatusCode::OK,
        set_cookies(state.cookies.bind(tokens)),
        Json(TokenResponse::from(tokens)),
    )
        .into_response()
}

async fn login(
    State(state): State<AuthState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, ApiAuthError> {
    let tokens = state
        .sessions
        .login_with_credentials(&state.db.users(), payload.email.trim(), &payload.password)
        .await
        .or_auth_err(&state.cookies)?;

    Ok(session_response(&state, &tokens))
}

/// New access token; the refresh cookie is left as it is.
async fn refresh(
    State(state): State<AuthState>,
    headers: HeaderMap,
) -> Result<Response, ApiAuthError> {
    let raw = refresh_cookie(&headers, &state.cookies)?;
    let tokens = state
        .sessions
        .refresh_access(raw)
        .await
        .or_auth_err(&state.cookies)?;

    Ok(session_response(&state, &tokens))
}

async fn rotate(
    State(state): State<AuthState>,
    headers: HeaderMap,
) -> Result<Response, ApiAuthError> {
    let raw = refresh_cookie(&headers, &state.cookies)?;
    let tokens = state
        .sessions
        .rotate_refresh(raw)
        .await
        .or_auth_err(&state.cookies)?;

    Ok(session_response(&state, &tokens))
}

/// Always succeeds: the session is removed if it can be found and both
/// cookies are cleared either way.
async fn logout(State(state): State<AuthState>, headers: HeaderMap) -> impl IntoResponse {
    let raw = get_cookie(&headers, REFRESH_COOKIE_NAME).filter(|token| !token.is_empty());
    state.sessions.logout(raw).await;

    (
        StatusCode::OK,
        set_cookies(state.cookies.cleared().to_vec()),
        Json(serde_json::json!({ "success": true })),
    )
}

#[derive(Serialize)]
struct LogoutAllResponse {
    revoked: u64,
}

async fn logout_all(
    State(state): State<AuthState>,
    Auth(auth): Auth,
) -> Result<impl IntoResponse, ApiAuthError> {
    let revoked = state
        .sessions
        .logout_everywhere(auth.user_id())
        .await
        .or_auth_err(&state.cookies)?;

    Ok((
        StatusCode::OK,
        set_cookies(state.cookies.cleared().to_vec()),
        Json(LogoutAllResponse { revoked }),
    ))
}

#[derive(Serialize)]
struct MeResponse {
    user_id: String,
    role: Option<String>,
}

async fn me(Auth(auth): Auth) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: auth.user_id().to_string(),
        role: auth.role().map(str::to_string),
    })
}

#[derive(Serialize)]
struct SessionInfo {
    id: String,
    /// Unix milliseconds
    created_at: i64,
    /// Unix milliseconds
    expires_at: i64,
}

#[derive(Serialize)]
struct ListSessionsResponse {
    sessions: Vec<SessionInfo>,
}

async fn list_sessions(
    State(state): State<AuthState>,
    Auth(auth): Auth,
) -> Result<impl IntoResponse, ApiAuthError> {
    let sessions = state
        .sessions
        .list_sessions(auth.user_id())
        .await
        .or_auth_err(&state.cookies)?;

    Ok(Json(ListSessionsResponse {
        sessions: sessions
            .into_iter()
            .map(|s| SessionInfo {
                id: s.id,
                created_at: s.created_at,
                expires_at: s.expires_at,
            })
            .collect(),
    }))
}

#[derive(Serialize)]
struct RevokeResponse {
    revoked: bool,
}

/// Sessions of other users are reported as not found.
async fn revoke_session(
    State(state): State<AuthState>,
    Auth(auth): Auth,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HandlerError> {
    let id = parse_session_id(&id)?;

    let revoked = state
        .sessions
        .revoke_session(auth.user_id(), &id.to_string())
        .await
        .or_auth_err(&state.cookies)?;

    if !revoked {
        return Err(ApiError::UnknownSession.into());
    }

    Ok(Json(RevokeResponse { revoked }))
}
