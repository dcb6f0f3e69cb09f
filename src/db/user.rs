//! User accounts with bcrypt password hashes.
//!
//! This is the identity collaborator the session layer trusts for password
//! checks: it turns `{email, password}` into a [`VerifiedUser`] or fails.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use super::{StoreError, now_millis};
use crate::session::{CredentialVerifier, SessionError, VerifiedUser};

/// Role assigned when the caller does not supply one.
pub const DEFAULT_ROLE: &str = "user";

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: String,
    /// Unix milliseconds
    pub created_at: i64,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    name: String,
    role: String,
    password_hash: String,
    created_at: i64,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            name: row.name,
            role: row.role,
            created_at: row.created_at,
        }
    }
}

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
    hash_cost: u32,
}

impl UserStore {
    pub fn new(pool: SqlitePool, hash_cost: u32) -> Self {
        Self { pool, hash_cost }
    }

    /// Create a user. The password is bcrypt-hashed before it is stored.
    pub async fn create(
        &self,
        email: &str,
        name: &str,
        password: &str,
        role: Option<&str>,
    ) -> Result<User, StoreError> {
        let password = password.to_string();
        let cost = self.hash_cost;
        let password_hash =
            tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??;

        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.to_string(),
            name: name.to_string(),
            role: role.unwrap_or(DEFAULT_ROLE).to_string(),
            created_at: now_millis(),
        };

        sqlx::query(
            "INSERT INTO users (id, email, name, role, password_hash, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.role)
        .bind(&password_hash)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;

        Ok(user)
    }

    async fn get_row_by_email(&self, email: &str) -> Result<Option<UserRow>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, email, name, role, password_hash, created_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
    }

    /// Check a password. Returns `None` for an unknown email or a wrong password.
    pub async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<User>, StoreError> {
        let row = self.get_row_by_email(email).await?;
        let password = password.to_string();
        let cost = self.hash_cost;

        match row {
            Some(row) => {
                let hash = row.password_hash.clone();
                let ok = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
                    .await??;
                Ok(ok.then(|| User::from(row)))
            }
            None => {
                // Spend the same work as a real check so response time does not
                // reveal whether the email exists.
                tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??;
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl CredentialVerifier for UserStore {
    async fn verify(&self, email: &str, password: &str) -> Result<VerifiedUser, SessionError> {
        match self.verify_credentials(email, password).await? {
            Some(user) => Ok(VerifiedUser::new(user.id, Some(user.role))),
            None => Err(SessionError::InvalidCredentials),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn users() -> UserStore {
        Database::open(":memory:")
            .await
            .unwrap()
            .with_hash_cost(4)
            .users()
    }

    #[tokio::test]
    async fn test_create_user_and_lookup_ignores_email_case() {
        let users = users().await;

        let user = users
            .create("alice@example.com", "Alice", "correct-pw", None)
            .await
            .unwrap();
        assert_eq!(user.role, DEFAULT_ROLE);

        let found = users
            .verify_credentials("Alice@Example.com", "correct-pw")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, user);
    }

    #[tokio::test]
    async fn test_verify_credentials() {
        let users = users().await;

        let user = users
            .create("alice@example.com", "Alice", "correct-pw", Some("admin"))
            .await
            .unwrap();

        let verified = users
            .verify_credentials("alice@example.com", "correct-pw")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(verified.id, user.id);
        assert_eq!(verified.role, "admin");

        assert!(
            users
                .verify_credentials("alice@example.com", "wrong-pw")
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            users
                .verify_credentials("bob@example.com", "correct-pw")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_credential_verifier() {
        let users = users().await;
        let user = users
            .create("alice@example.com", "Alice", "correct-pw", None)
            .await
            .unwrap();

        let verified = CredentialVerifier::verify(&users, "alice@example.com", "correct-pw")
            .await
            .unwrap();
        assert_eq!(verified.user_id(), user.id);
        assert_eq!(verified.role(), Some(DEFAULT_ROLE));

        let err = CredentialVerifier::verify(&users, "alice@example.com", "nope")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidCredentials));
    }
}
