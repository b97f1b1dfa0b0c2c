//! Session persistence backing cookie authentication.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserSession {
    pub id: String,
    pub user_id: i32,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub async fn create_session(
    pool: &PgPool,
    token: &str,
    user_id: i32,
    expires_at: DateTime<Utc>,
) -> Result<UserSession> {
    sqlx::query_as::<_, UserSession>(
        "INSERT INTO user_sessions (id, user_id, expires_at) VALUES ($1, $2, $3) \
         RETURNING id, user_id, created_at, last_active_at, expires_at",
    )
    .bind(token)
    .bind(user_id)
    .bind(expires_at)
    .fetch_one(pool)
    .await
    .context("failed to create session")
}

/// Fetch a session only if it has not expired.
pub async fn get_active_session(pool: &PgPool, token: &str) -> Result<Option<UserSession>> {
    sqlx::query_as::<_, UserSession>(
        "SELECT id, user_id, created_at, last_active_at, expires_at \
         FROM user_sessions WHERE id = $1 AND expires_at > now()",
    )
    .bind(token)
    .fetch_optional(pool)
    .await
    .context("failed to fetch session")
}

pub async fn touch_session(pool: &PgPool, token: &str) -> Result<()> {
    sqlx::query("UPDATE user_sessions SET last_active_at = now() WHERE id = $1")
        .bind(token)
        .execute(pool)
        .await
        .context("failed to touch session")?;
    Ok(())
}

pub async fn delete_session(pool: &PgPool, token: &str) -> Result<()> {
    sqlx::query("DELETE FROM user_sessions WHERE id = $1")
        .bind(token)
        .execute(pool)
        .await
        .context("failed to delete session")?;
    Ok(())
}

/// Remove expired sessions, returning how many were deleted.
pub async fn cleanup_expired(pool: &PgPool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at <= now()")
        .execute(pool)
        .await
        .context("failed to clean up expired sessions")?;
    Ok(result.rows_affected())
}

pub async fn count_active(pool: &PgPool) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user_sessions WHERE expires_at > now()")
        .fetch_one(pool)
        .await
        .context("failed to count sessions")?;
    Ok(count)
}
