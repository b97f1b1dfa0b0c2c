//! User account persistence.

use anyhow::{Context, Result};
use sqlx::PgPool;

use super::models::{User, UserRole};

const USER_COLUMNS: &str = "id, email, password_hash, nickname, role, profile_image_url, \
                            is_active, created_at, updated_at";

/// Outcome of an attempted signup.
#[derive(Debug)]
pub enum CreateUserOutcome {
    Created(User),
    EmailTaken,
    NicknameTaken,
}

/// Insert a new account, reporting uniqueness conflicts instead of failing.
pub async fn create_user(
    pool: &PgPool,
    email: &str,
    password_hash: &str,
    nickname: &str,
    role: UserRole,
) -> Result<CreateUserOutcome> {
    let result = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (email, password_hash, nickname, role) \
         VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
    ))
    .bind(email)
    .bind(password_hash)
    .bind(nickname)
    .bind(role.as_str())
    .fetch_one(pool)
    .await;

    match result {
        Ok(user) => Ok(CreateUserOutcome::Created(user)),
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            if db.constraint().is_some_and(|c| c.contains("nickname")) {
                Ok(CreateUserOutcome::NicknameTaken)
            } else {
                Ok(CreateUserOutcome::EmailTaken)
            }
        }
        Err(e) => Err(e).context("failed to insert user"),
    }
}

pub async fn get_user(pool: &PgPool, id: i32) -> Result<Option<User>> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch user")
}

pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<User>> {
    sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
    ))
    .bind(email)
    .fetch_optional(pool)
    .await
    .context("failed to fetch user by email")
}

/// List all users, newest first.
pub async fn list_users(pool: &PgPool) -> Result<Vec<User>> {
    sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC"
    ))
    .fetch_all(pool)
    .await
    .context("failed to list users")
}

/// Change a user's role. Returns `None` when the user does not exist.
pub async fn set_role(pool: &PgPool, id: i32, role: UserRole) -> Result<Option<User>> {
    sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET role = $2, updated_at = now() WHERE id = $1 RETURNING {USER_COLUMNS}"
    ))
    .bind(id)
    .bind(role.as_str())
    .fetch_optional(pool)
    .await
    .context("failed to set user role")
}

/// Activate or deactivate an account. Deactivation also drops its sessions.
pub async fn set_active(pool: &PgPool, id: i32, is_active: bool) -> Result<Option<User>> {
    let mut tx = pool.begin().await?;
    let user = sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET is_active = $2, updated_at = now() WHERE id = $1 RETURNING {USER_COLUMNS}"
    ))
    .bind(id)
    .bind(is_active)
    .fetch_optional(&mut *tx)
    .await
    .context("failed to set user active flag")?;

    if user.is_some() && !is_active {
        sqlx::query("DELETE FROM user_sessions WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("failed to drop sessions of deactivated user")?;
    }
    tx.commit().await?;
    Ok(user)
}

/// Outcome of a profile update.
#[derive(Debug)]
pub enum UpdateProfileOutcome {
    Updated(User),
    NicknameTaken,
    NotFound,
}

pub async fn update_nickname(pool: &PgPool, id: i32, nickname: &str) -> Result<UpdateProfileOutcome> {
    let result = sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET nickname = $2, updated_at = now() WHERE id = $1 RETURNING {USER_COLUMNS}"
    ))
    .bind(id)
    .bind(nickname)
    .fetch_optional(pool)
    .await;

    match result {
        Ok(Some(user)) => Ok(UpdateProfileOutcome::Updated(user)),
        Ok(None) => Ok(UpdateProfileOutcome::NotFound),
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            Ok(UpdateProfileOutcome::NicknameTaken)
        }
        Err(e) => Err(e).context("failed to update nickname"),
    }
}

/// Replace the profile image URL.
///
/// Returns `None` when the user does not exist, otherwise the previous URL so the
/// caller can remove the old file.
pub async fn set_profile_image(
    pool: &PgPool,
    id: i32,
    url: &str,
) -> Result<Option<Option<String>>> {
    let mut tx = pool.begin().await?;
    let previous: Option<(Option<String>,)> =
        sqlx::query_as("SELECT profile_image_url FROM users WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .context("failed to lock user row")?;
    let Some((previous,)) = previous else {
        return Ok(None);
    };

    sqlx::query("UPDATE users SET profile_image_url = $2, updated_at = now() WHERE id = $1")
        .bind(id)
        .bind(url)
        .execute(&mut *tx)
        .await
        .context("failed to set profile image")?;
    tx.commit().await?;
    Ok(Some(previous))
}

/// Ensure the configured seed admin exists and has the admin role.
pub async fn ensure_seed_admin(
    pool: &PgPool,
    email: &str,
    password_hash: &str,
) -> Result<User> {
    let nickname = email.split('@').next().unwrap_or("admin");
    sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (email, password_hash, nickname, role) \
         VALUES ($1, $2, $3, 'admin') \
         ON CONFLICT (email) DO UPDATE SET role = 'admin', is_active = TRUE, updated_at = now() \
         RETURNING {USER_COLUMNS}"
    ))
    .bind(email)
    .bind(password_hash)
    .bind(format!("{nickname}-admin"))
    .fetch_one(pool)
    .await
    .context("failed to upsert seed admin")
}
