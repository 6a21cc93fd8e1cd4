// src/auth/session.rs

use chrono::{DateTime, Duration, Utc};
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;

use crate::models::user::{User, UserRow};

pub const GUEST_SESSION_DAYS: i64 = 30;
pub const FEDERATED_SESSION_DAYS: i64 = 60;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,

    #[error("session expired")]
    Expired,

    #[error("session storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// A freshly issued session. `token` is the only copy of the credential.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub user_id: i64,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// 256 bits from the OS CSPRNG, hex encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Sessions are looked up by this digest; raw tokens are never stored.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[derive(FromRow)]
struct SessionRow {
    expires_at: DateTime<Utc>,
    #[sqlx(flatten)]
    user: UserRow,
}

#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates an anonymous user and its session in one transaction.
    pub async fn create_guest_session(&self, ttl: Duration) -> Result<IssuedSession, SessionError> {
        let now = Utc::now();
        let expires_at = now + ttl;
        let token = generate_token();

        let mut tx = self.pool.begin().await?;
        let (user_id,): (i64,) = sqlx::query_as(
            "INSERT INTO users (federated_subject, profile, created_at, updated_at) VALUES (NULL, NULL, ?, ?) RETURNING id",
        )
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO sessions (token_hash, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(hash_token(&token))
        .bind(user_id)
        .bind(expires_at)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!("Guest login created user {}", user_id);
        Ok(IssuedSession {
            user_id,
            token,
            expires_at,
        })
    }

    pub async fn create_session_for_user(
        &self,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<String, SessionError> {
        let token = generate_token();
        sqlx::query(
            "INSERT INTO sessions (token_hash, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(hash_token(&token))
        .bind(user_id)
        .bind(expires_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(token)
    }

    /// Maps a token to its user. Expired rows are reported, not removed.
    pub async fn resolve(&self, token: &str) -> Result<User, SessionError> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT s.expires_at, u.id, u.profile
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.token_hash = ?
            "#,
        )
        .bind(hash_token(token))
        .fetch_optional(&self.pool)
        .await?
        .ok_or(SessionError::NotFound)?;

        if row.expires_at <= Utc::now() {
            return Err(SessionError::Expired);
        }
        Ok(row.user.into())
    }

    pub async fn delete(&self, token: &str) -> Result<(), SessionError> {
        sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(hash_token(token))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Removes sessions whose expiry has passed. Returns how many went.
    pub async fn purge_expired(&self) -> Result<u64, SessionError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
