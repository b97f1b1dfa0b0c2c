//! Axum extractors for session authentication.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::data::models::User;
use crate::data::reviews::Actor;
use crate::state::AppState;
use crate::web::error::{ApiError, db_error};

use super::session_token;

/// A logged-in, active user. Rejects with 401 otherwise.
pub struct AuthUser(pub User);

/// A logged-in admin. Rejects with 401 when anonymous and 403 for non-admins.
pub struct AdminUser(pub User);

/// The current user, if any. Never rejects on missing or stale sessions.
pub struct MaybeUser(pub Option<User>);

impl AuthUser {
    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.0.id,
            is_admin: self.0.is_admin(),
        }
    }
}

impl MaybeUser {
    pub fn id(&self) -> Option<i32> {
        self.0.as_ref().map(|u| u.id)
    }
}

async fn current_user(parts: &Parts, state: &AppState) -> Result<Option<User>, ApiError> {
    let Some(token) = session_token(&parts.headers) else {
        return Ok(None);
    };
    state
        .session_cache
        .get_user(&token)
        .await
        .map_err(|e| db_error("Session lookup", e))
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        current_user(parts, state)
            .await?
            .map(AuthUser)
            .ok_or_else(|| ApiError::unauthorized("Login required"))
    }
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            tracing::info!(user_id = user.id, path = %parts.uri.path(), "non-admin denied");
            return Err(ApiError::forbidden("Admin access required"));
        }
        Ok(AdminUser(user))
    }
}

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        current_user(parts, state).await.map(MaybeUser)
    }
}
