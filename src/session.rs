//! Session lifecycle: login, access refresh, refresh rotation and logout.
//!
//! A session is a stored hash of one refresh token. It is created at login or
//! rotation, never modified, and ends by logout, rotation, or expiry followed by
//! the cleanup sweep. Password checking happens before this layer; `login` only
//! accepts a [`VerifiedUser`] produced by a [`CredentialVerifier`].

use async_trait::async_trait;
use std::sync::Arc;

use crate::audit::{AuditEventKind, AuditSink};
use crate::db::{Session, SessionStore, StoreError};
use crate::jwt::{Claims, IssuedToken, JwtConfig, TokenError, TokenType};

/// An identity whose credentials were already checked by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedUser {
    user_id: String,
    role: Option<String>,
}

impl VerifiedUser {
    pub fn new(user_id: impl Into<String>, role: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }
}

/// Identity provider seam: `{email, password}` to a verified user.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, email: &str, password: &str) -> Result<VerifiedUser, SessionError>;
}

/// Errors from session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Caller is not authenticated")]
    AuthenticationError,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Invalid refresh token: {0}")]
    InvalidRefreshToken(TokenError),
    #[error("Session not found")]
    SessionNotFound,
    #[error("Failed to mint token: {0}")]
    Token(TokenError),
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}

/// What the client should do after a failed session operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Credentials are no good: 401 and clear both cookies.
    Reauthenticate,
    /// Server-side failure: 5xx and leave cookies alone.
    RetryLater,
}

impl SessionError {
    pub fn outcome(&self) -> Outcome {
        match self {
            SessionError::AuthenticationError
            | SessionError::InvalidCredentials
            | SessionError::InvalidRefreshToken(_)
            | SessionError::SessionNotFound => Outcome::Reauthenticate,
            SessionError::Token(_) | SessionError::Persistence(_) => Outcome::RetryLater,
        }
    }
}

/// Tokens handed to the transport layer after a session operation.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub user_id: String,
    pub role: Option<String>,
    /// The session backing the refresh token
    pub session_id: String,
    pub access: IssuedToken,
    /// Set when a new refresh token was issued (login, rotation)
    pub refresh: Option<IssuedToken>,
}

#[derive(Clone)]
pub struct SessionManager {
    jwt: Arc<JwtConfig>,
    sessions: SessionStore,
    audit: Arc<dyn AuditSink>,
}

impl SessionManager {
    pub fn new(jwt: Arc<JwtConfig>, sessions: SessionStore, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            jwt,
            sessions,
            audit,
        }
    }

    pub fn jwt(&self) -> &JwtConfig {
        &self.jwt
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Check credentials with `verifier`, then log in.
    pub async fn login_with_credentials<V>(
        &self,
        verifier: &V,
        email: &str,
        password: &str,
    ) -> Result<SessionTokens, SessionError>
    where
        V: CredentialVerifier + ?Sized,
    {
        match verifier.verify(email, password).await {
            Ok(user) => self.login(&user).await,
            Err(e) => {
                if matches!(e, SessionError::InvalidCredentials) {
                    self.audit
                        .log_event(AuditEventKind::LoginFailure, &[("reason", "invalid_credentials".into())]);
                }
                Err(e)
            }
        }
    }

    /// Issue an access/refresh pair and persist the refresh token's hash.
    pub async fn login(&self, user: &VerifiedUser) -> Result<SessionTokens, SessionError> {
        if user.user_id.trim().is_empty() {
            self.audit
                .log_event(AuditEventKind::LoginFailure, &[("reason", "unverified".into())]);
            return Err(SessionError::AuthenticationError);
        }

        let access = self
            .jwt
            .mint_access(&user.user_id, user.role())
            .map_err(SessionError::Token)?;
        let refresh = self
            .jwt
            .mint_refresh(&user.user_id, user.role())
            .map_err(SessionError::Token)?;

        let session_id = self
            .sessions
            .create_expiring_at(&user.user_id, &refresh.token, expiry_millis(&refresh))
            .await?;

        self.audit.log_event(
            AuditEventKind::LoginSuccess,
            &[
                ("user_id", user.user_id.clone()),
                ("session_id", session_id.clone()),
            ],
        );

        Ok(SessionTokens {
            user_id: user.user_id.clone(),
            role: user.role.clone(),
            session_id,
            access,
            refresh: Some(refresh),
        })
    }

    /// Mint a new access token from a live refresh token. The session and the
    /// refresh token are left as they are.
    pub async fn refresh_access(&self, raw_refresh: &str) -> Result<SessionTokens, SessionError> {
        let (claims, session) = self.resolve(raw_refresh).await?;

        let access = self
            .jwt
            .mint_access(&claims.sub, claims.role.as_deref())
            .map_err(SessionError::Token)?;

        self.audit.log_event(
            AuditEventKind::AccessRefreshed,
            &[
                ("user_id", claims.sub.clone()),
                ("session_id", session.id.clone()),
            ],
        );

        Ok(SessionTokens {
            user_id: claims.sub,
            role: claims.role,
            session_id: session.id,
            access,
            refresh: None,
        })
    }

    /// Replace a refresh token (and its session) with a new one.
    ///
    /// Of two rotations racing on the same token, exactly one succeeds; the other
    /// gets `SessionNotFound`.
    pub async fn rotate_refresh(&self, raw_refresh: &str) -> Result<SessionTokens, SessionError> {
        let (claims, old) = self.resolve(raw_refresh).await?;
        let role = claims.role.as_deref();

        let access = self
            .jwt
            .mint_access(&claims.sub, role)
            .map_err(SessionError::Token)?;
        let refresh = self
            .jwt
            .mint_refresh(&claims.sub, role)
            .map_err(SessionError::Token)?;

        let session_id = match self
            .sessions
            .rotate(&old.id, &claims.sub, &refresh.token, expiry_millis(&refresh))
            .await?
        {
            Some(id) => id,
            None => {
                self.audit.log_event(
                    AuditEventKind::SessionNotFound,
                    &[
                        ("user_id", claims.sub.clone()),
                        ("session_id", old.id.clone()),
                    ],
                );
                return Err(SessionError::SessionNotFound);
            }
        };

        self.audit.log_event(
            AuditEventKind::SessionRotated,
            &[
                ("user_id", claims.sub.clone()),
                ("old_session_id", old.id),
                ("session_id", session_id.clone()),
            ],
        );

        Ok(SessionTokens {
            user_id: claims.sub,
            role: claims.role,
            session_id,
            access,
            refresh: Some(refresh),
        })
    }

    /// Best-effort logout. Deletes the session behind `raw_refresh` if there is
    /// one and swallows every failure. Returns whether a session was removed.
    pub async fn logout(&self, raw_refresh: Option<&str>) -> bool {
        let removed = match raw_refresh {
            Some(raw) => self.delete_matching(raw).await,
            None => None,
        };

        let mut attributes = vec![("session_found", removed.is_some().to_string())];
        if let Some((user_id, session_id)) = &removed {
            attributes.push(("user_id", user_id.clone()));
            attributes.push(("session_id", session_id.clone()));
        }
        self.audit.log_event(AuditEventKind::Logout, &attributes);

        removed.is_some()
    }

    async fn delete_matching(&self, raw: &str) -> Option<(String, String)> {
        let claims = self.jwt.verify(raw, TokenType::Refresh).ok()?;

        let session = match self.sessions.match_session(&claims.sub, raw).await {
            Ok(session) => session?,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to look up session during logout");
                return None;
            }
        };

        match self.sessions.delete(&session.id).await {
            Ok(true) => Some((claims.sub, session.id)),
            Ok(false) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to delete session during logout");
                None
            }
        }
    }

    /// Delete every session of a user.
    pub async fn logout_everywhere(&self, user_id: &str) -> Result<u64, SessionError> {
        let count = self.sessions.delete_all_for_user(user_id).await?;
        self.audit.log_event(
            AuditEventKind::SessionRevoked,
            &[("user_id", user_id.to_string()), ("count", count.to_string())],
        );
        Ok(count)
    }

    /// Active sessions of a user, newest first.
    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<Session>, SessionError> {
        Ok(self.sessions.find_active(user_id).await?)
    }

    /// Revoke one of the user's own sessions. Returns false if no such session
    /// belongs to the user.
    pub async fn revoke_session(&self, user_id: &str, session_id: &str) -> Result<bool, SessionError> {
        let revoked = self.sessions.delete_for_user(session_id, user_id).await?;
        if revoked {
            self.audit.log_event(
                AuditEventKind::SessionRevoked,
                &[
                    ("user_id", user_id.to_string()),
                    ("session_id", session_id.to_string()),
                ],
            );
        }
        Ok(revoked)
    }

    /// Validate an access token presented by a client.
    pub fn authenticate(&self, access_token: &str) -> Result<Claims, TokenError> {
        self.jwt
            .verify(access_token, TokenType::Access)
            .inspect_err(|e| {
                self.audit.log_event(
                    AuditEventKind::TokenInvalid,
                    &[("token_type", "access".into()), ("reason", e.to_string())],
                );
            })
    }

    /// Verify a refresh token and find the session it belongs to.
    async fn resolve(&self, raw_refresh: &str) -> Result<(Claims, Session), SessionError> {
        let claims = match self.jwt.verify(raw_refresh, TokenType::Refresh) {
            Ok(claims) => claims,
            Err(e) => {
                self.audit.log_event(
                    AuditEventKind::TokenInvalid,
                    &[("token_type", "refresh".into()), ("reason", e.to_string())],
                );
                return Err(SessionError::InvalidRefreshToken(e));
            }
        };

        match self.sessions.match_session(&claims.sub, raw_refresh).await? {
            Some(session) => Ok((claims, session)),
            None => {
                // Signed by us but revoked, rotated away or unknown: untrusted.
                self.audit.log_event(
                    AuditEventKind::SessionNotFound,
                    &[("user_id", claims.sub.clone())],
                );
                Err(SessionError::SessionNotFound)
            }
        }
    }
}

/// Session rows expire together with their refresh token.
fn expiry_millis(token: &IssuedToken) -> i64 {
    i64::try_from(token.expires_at)
        .unwrap_or(i64::MAX / 1000)
        .saturating_mul(1000)
}
