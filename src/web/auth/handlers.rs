//! Signup, login and logout.

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{AppendHeaders, IntoResponse};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use ts_rs::TS;

use crate::data::models::{UserResponse, UserRole};
use crate::data::users::{self, CreateUserOutcome};
use crate::state::AppState;
use crate::web::error::{ApiError, db_error};
use crate::web::middleware::client_ip::ClientIp;

use super::password::{hash_password, validate_password, verify_dummy, verify_password};
use super::{clear_session_cookie, session_cookie, session_token};

const MIN_NICKNAME_CHARS: usize = 2;
const MAX_NICKNAME_CHARS: usize = 20;
const MAX_EMAIL_LEN: usize = 254;

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub nickname: String,
}

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AuthResponse {
    pub user: UserResponse,
}

/// Trim and lower-case an email, rejecting obviously malformed ones.
pub fn normalize_email(raw: &str) -> Result<String, String> {
    let email = raw.trim().to_lowercase();
    let valid = email.len() <= MAX_EMAIL_LEN
        && !email.contains(char::is_whitespace)
        && email.split_once('@').is_some_and(|(local, domain)| {
            !local.is_empty() && !domain.contains('@') && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        });
    if valid {
        Ok(email)
    } else {
        Err("invalid email address".into())
    }
}

pub fn normalize_nickname(raw: &str) -> Result<String, String> {
    let nickname = raw.trim().to_string();
    let len = nickname.chars().count();
    if !(MIN_NICKNAME_CHARS..=MAX_NICKNAME_CHARS).contains(&len) {
        return Err(format!(
            "nickname must be {MIN_NICKNAME_CHARS}-{MAX_NICKNAME_CHARS} characters"
        ));
    }
    Ok(nickname)
}

/// `POST /api/auth/signup`. Create an account and log in.
#[instrument(skip_all)]
pub async fn signup(
    State(state): State<AppState>,
    Json(body): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = normalize_email(&body.email).map_err(ApiError::bad_request)?;
    let nickname = normalize_nickname(&body.nickname).map_err(ApiError::bad_request)?;
    validate_password(&body.password).map_err(ApiError::bad_request)?;

    let password = body.password;
    let hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| db_error("Password hashing", e))?
        .map_err(|e| db_error("Password hashing", e))?;

    let user = match users::create_user(&state.db_pool, &email, &hash, &nickname, UserRole::User)
        .await
        .map_err(|e| db_error("Signup", e))?
    {
        CreateUserOutcome::Created(user) => user,
        CreateUserOutcome::EmailTaken => {
            return Err(ApiError::conflict("Email is already registered"));
        }
        CreateUserOutcome::NicknameTaken => {
            return Err(ApiError::conflict("Nickname is already taken"));
        }
    };

    let token = state
        .session_cache
        .create(&user)
        .await
        .map_err(|e| db_error("Create session", e))?;
    info!(user_id = user.id, "user signed up");

    let cookie = session_cookie(&token, state.session_cache.ttl(), state.config.cookie_secure);
    Ok((
        StatusCode::CREATED,
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(AuthResponse {
            user: UserResponse::from(&user),
        }),
    ))
}

/// `POST /api/auth/login`
#[instrument(skip_all, fields(ip = %client_ip.0))]
pub async fn login(
    client_ip: ClientIp,
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let invalid = || ApiError::unauthorized("Invalid email or password");

    let email = normalize_email(&body.email).map_err(|_| invalid())?;
    let password = body.password;
    let Some(user) = users::find_by_email(&state.db_pool, &email)
        .await
        .map_err(|e| db_error("Login", e))?
    else {
        tokio::task::spawn_blocking(move || verify_dummy(&password))
            .await
            .map_err(|e| db_error("Password verification", e))?;
        return Err(invalid());
    };

    let hash = user.password_hash.clone();
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| db_error("Password verification", e))?;
    if !verified {
        info!(user_id = user.id, "login rejected: wrong password");
        return Err(invalid());
    }
    if !user.is_active {
        info!(user_id = user.id, "login rejected: account deactivated");
        return Err(ApiError::forbidden("Account is deactivated"));
    }

    let token = state
        .session_cache
        .create(&user)
        .await
        .map_err(|e| db_error("Create session", e))?;
    info!(user_id = user.id, "user logged in");

    let cookie = session_cookie(&token, state.session_cache.ttl(), state.config.cookie_secure);
    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(AuthResponse {
            user: UserResponse::from(&user),
        }),
    ))
}

/// `POST /api/auth/logout`. Idempotent; always clears the cookie.
#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(token) = session_token(&headers) {
        state
            .session_cache
            .remove(&token)
            .await
            .map_err(|e| db_error("Logout", e))?;
    }
    Ok((
        StatusCode::NO_CONTENT,
        AppendHeaders([(header::SET_COOKIE, clear_session_cookie(state.config.cookie_secure))]),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Foo@Example.COM ").unwrap(), "foo@example.com");
        assert!(normalize_email("no-at-sign").is_err());
        assert!(normalize_email("a@b").is_err());
        assert!(normalize_email("a@@b.com").is_err());
        assert!(normalize_email("@b.com").is_err());
        assert!(normalize_email("a b@c.com").is_err());
    }

    #[test]
    fn test_normalize_nickname() {
        assert_eq!(normalize_nickname(" 먹보 ").unwrap(), "먹보");
        assert!(normalize_nickname("a").is_err());
        assert!(normalize_nickname(&"가".repeat(21)).is_err());
    }
}
