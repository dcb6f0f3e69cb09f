//! JWT token generation and validation.
//!
//! Access and refresh tokens are signed with separate HS256 secrets, so a leaked
//! access secret cannot be used to forge refresh tokens and vice versa. Both kinds
//! carry issuer/audience claims and are rejected outside that domain.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived access token - stateless, never stored
    Access,
    /// Long-lived refresh token - stored server-side as a hash
    Refresh,
}

impl TokenType {
    fn other(self) -> Self {
        match self {
            TokenType::Access => TokenType::Refresh,
            TokenType::Refresh => TokenType::Access,
        }
    }
}

/// JWT claims shared by both token kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// Opaque role supplied by the identity provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Token type
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Uniqueness salt (refresh tokens only). Two refresh tokens for the same
    /// user are never byte-identical.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
}

/// Default access token lifetime: 15 minutes
pub const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(15 * 60);

/// Default refresh token lifetime: 7 days
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub const DEFAULT_ISSUER: &str = "auraflow";
pub const DEFAULT_AUDIENCE: &str = "auraflow-web";

#[derive(Clone)]
struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// Configuration for JWT operations.
#[derive(Clone)]
pub struct JwtConfig {
    access_keys: SigningKeys,
    refresh_keys: SigningKeys,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
    leeway_secs: u64,
}

/// A freshly minted token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The JWT token string
    pub token: String,
    /// Uniqueness salt (refresh tokens only)
    pub jti: Option<String>,
    /// Issued at timestamp (Unix seconds)
    pub issued_at: u64,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

impl JwtConfig {
    /// Create a new JWT configuration. The two secrets should differ.
    pub fn new(access_secret: &[u8], refresh_secret: &[u8]) -> Self {
        Self {
            access_keys: SigningKeys::from_secret(access_secret),
            refresh_keys: SigningKeys::from_secret(refresh_secret),
            issuer: DEFAULT_ISSUER.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            access_ttl: DEFAULT_ACCESS_TTL,
            refresh_ttl: DEFAULT_REFRESH_TTL,
            leeway_secs: 0,
        }
    }

    pub fn with_scope(mut self, issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self.audience = audience.into();
        self
    }

    pub fn with_ttls(mut self, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        self.access_ttl = access_ttl;
        self.refresh_ttl = refresh_ttl;
        self
    }

    /// Clock-skew tolerance applied to expiry checks.
    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Generate an access token for a user.
    pub fn mint_access(&self, user_id: &str, role: Option<&str>) -> Result<IssuedToken, TokenError> {
        self.mint_at(TokenType::Access, user_id, role, unix_now())
    }

    /// Generate a refresh token for a user, salted with a fresh `jti`.
    /// The role rides along so refreshed access tokens keep it.
    pub fn mint_refresh(
        &self,
        user_id: &str,
        role: Option<&str>,
    ) -> Result<IssuedToken, TokenError> {
        self.mint_at(TokenType::Refresh, user_id, role, unix_now())
    }

    pub(crate) fn mint_at(
        &self,
        token_type: TokenType,
        user_id: &str,
        role: Option<&str>,
        now: u64,
    ) -> Result<IssuedToken, TokenError> {
        let (ttl, jti) = match token_type {
            TokenType::Access => (self.access_ttl, None),
            TokenType::Refresh => (self.refresh_ttl, Some(uuid::Uuid::new_v4().to_string())),
        };
        let duration = ttl.as_secs();
        let exp = now.saturating_add(duration);

        let claims = Claims {
            sub: user_id.to_string(),
            role: role.map(str::to_string),
            token_type,
            jti: jti.clone(),
            iat: now,
            exp,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };

        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.keys(token_type).encoding,
        )
        .map_err(TokenError::Encoding)?;

        Ok(IssuedToken {
            token,
            jti,
            issued_at: now,
            expires_at: exp,
            duration,
        })
    }

    /// Validate and decode a token of the expected kind.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, TokenError> {
        self.verify_at(token, expected, unix_now())
    }

    pub(crate) fn verify_at(
        &self,
        token: &str,
        expected: TokenType,
        now: u64,
    ) -> Result<Claims, TokenError> {
        let claims = match self.decode(token, expected) {
            Ok(claims) => claims,
            Err(e) => {
                // Genuine token of the other kind, signed with the other secret.
                if self.decode(token, expected.other()).is_ok() {
                    return Err(TokenError::WrongType);
                }
                return Err(e);
            }
        };

        if claims.token_type != expected {
            return Err(TokenError::WrongType);
        }

        if now >= claims.exp.saturating_add(self.leeway_secs) {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    fn decode(&self, token: &str, token_type: TokenType) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        // Expiry is checked by `verify_at` so the boundary matches session expiry.
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "iat", "sub", "iss", "aud"]);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);

        jsonwebtoken::decode::<Claims>(token, &self.keys(token_type).decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| TokenError::InvalidSignature)
    }

    fn keys(&self, token_type: TokenType) -> &SigningKeys {
        match token_type {
            TokenType::Access => &self.access_keys,
            TokenType::Refresh => &self.refresh_keys,
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Errors that can occur during JWT operations.
///
/// Verification only ever yields `InvalidSignature`, `Expired` or `WrongType`;
/// the underlying library error is not exposed.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Failed to encode token: {0}")]
    Encoding(jsonwebtoken::errors::Error),
    #[error("Invalid token signature")]
    InvalidSignature,
    #[error("Token expired")]
    Expired,
    #[error("Wrong token type")]
    WrongType,
}
