//! Session storage for refresh token tracking and revocation.
//!
//! Only a one-way hash of each refresh token is stored. The hash is bcrypt over the
//! hex SHA-256 digest of the raw token: the digest keeps the input inside bcrypt's
//! 72-byte window, and the per-row salt means rows can only be matched by verifying
//! the raw token against each candidate hash in turn.

use sha2::{Digest, Sha256};
use sqlx::sqlite::SqlitePool;
use std::time::Duration;

use super::{StoreError, now_millis};

/// An active refresh token record.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    /// Unix milliseconds
    pub expires_at: i64,
    /// Unix milliseconds
    pub created_at: i64,
}

impl Session {
    /// A session authorizes nothing once `now >= expires_at`.
    pub fn is_active_at(&self, now_millis: i64) -> bool {
        now_millis < self.expires_at
    }
}

/// Hash a raw refresh token for storage.
pub fn hash_token(raw_token: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(sha256_hex(raw_token), cost)
}

/// Check a raw refresh token against a stored hash. bcrypt compares in constant time.
pub fn verify_token_hash(raw_token: &str, token_hash: &str) -> Result<bool, bcrypt::BcryptError> {
    bcrypt::verify(sha256_hex(raw_token), token_hash)
}

fn sha256_hex(raw_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_token.as_bytes());
    hex::encode(hasher.finalize())
}

fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

/// Store for managing refresh token sessions.
#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
    hash_cost: u32,
}

impl SessionStore {
    pub fn new(pool: SqlitePool, hash_cost: u32) -> Self {
        Self { pool, hash_cost }
    }

    async fn hash(&self, raw_token: &str) -> Result<String, StoreError> {
        let raw_token = raw_token.to_string();
        let cost = self.hash_cost;
        let hash = tokio::task::spawn_blocking(move || hash_token(&raw_token, cost)).await??;
        Ok(hash)
    }

    /// Create a new session for a refresh token. Returns the session id.
    pub async fn create(
        &self,
        user_id: &str,
        raw_token: &str,
        ttl: Duration,
    ) -> Result<String, StoreError> {
        let expires_at = now_millis().saturating_add(ttl_millis(ttl));
        self.create_expiring_at(user_id, raw_token, expires_at).await
    }

    /// Create a new session with an absolute expiry (Unix milliseconds).
    pub async fn create_expiring_at(
        &self,
        user_id: &str,
        raw_token: &str,
        expires_at: i64,
    ) -> Result<String, StoreError> {
        let token_hash = self.hash(raw_token).await?;
        let id = uuid::Uuid::new_v4().to_string();

        sqlx::query(
            "INSERT INTO sessions (id, user_id, token_hash, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(&token_hash)
        .bind(expires_at)
        .bind(now_millis())
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    /// Get a session by id, expired or not.
    pub async fn get(&self, id: &str) -> Result<Option<Session>, StoreError> {
        let session = sqlx::query_as::<_, Session>(
            "SELECT id, user_id, token_hash, expires_at, created_at FROM sessions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    /// List the unexpired sessions of a user, newest first.
    pub async fn find_active(&self, user_id: &str) -> Result<Vec<Session>, StoreError> {
        let sessions = sqlx::query_as::<_, Session>(
            "SELECT id, user_id, token_hash, expires_at, created_at FROM sessions WHERE user_id = ? AND expires_at > ? ORDER BY created_at DESC, id",
        )
        .bind(user_id)
        .bind(now_millis())
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }

    /// Find the active session of `user_id` whose hash matches `raw_token`.
    ///
    /// Salted hashes cannot be looked up by value, so every active session of the
    /// user is checked in turn.
    pub async fn match_session(
        &self,
        user_id: &str,
        raw_token: &str,
    ) -> Result<Option<Session>, StoreError> {
        let candidates = self.find_active(user_id).await?;
        if candidates.is_empty() {
            return Ok(None);
        }

        let raw_token = raw_token.to_string();
        let found = tokio::task::spawn_blocking(move || {
            candidates.into_iter().find(|session| {
                verify_token_hash(&raw_token, &session.token_hash).unwrap_or_else(|e| {
                    tracing::warn!(session_id = %session.id, error = %e, "Unreadable session hash");
                    false
                })
            })
        })
        .await?;

        Ok(found)
    }

    /// Delete a session by id. Returns whether a row was removed.
    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a session only if it belongs to `user_id`.
    pub async fn delete_for_user(&self, id: &str, user_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete all sessions for a user (logout everywhere).
    pub async fn delete_all_for_user(&self, user_id: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete every session with `expires_at <= now`.
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Replace `old_session_id` with a new session for `new_raw_token`, expiring
    /// at `expires_at` (Unix milliseconds).
    ///
    /// The insert and the delete share one transaction, and the old row is only
    /// removed once the new one is written. If the old row is already gone (a
    /// concurrent rotation or logout won), nothing is committed and `None` is
    /// returned.
    pub async fn rotate(
        &self,
        old_session_id: &str,
        user_id: &str,
        new_raw_token: &str,
        expires_at: i64,
    ) -> Result<Option<String>, StoreError> {
        let token_hash = self.hash(new_raw_token).await?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_millis();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO sessions (id, user_id, token_hash, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(&token_hash)
        .bind(expires_at)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let deleted =
            sqlx::query("DELETE FROM sessions WHERE id = ? AND user_id = ? AND expires_at > ?")
                .bind(old_session_id)
                .bind(user_id)
                .bind(now)
                .execute(&mut *tx)
                .await?;

        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        tx.commit().await?;
        Ok(Some(id))
    }
}
