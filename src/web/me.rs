//! The current user's profile, reviews, likes and inquiries.

use axum::extract::{Multipart, State};
use axum::response::Json;
use axum_extra::extract::Query;
use serde::Deserialize;
use tracing::{info, instrument};
use ts_rs::TS;

use crate::data::inquiries::{self, InquiryListResponse};
use crate::data::models::UserResponse;
use crate::data::restaurant_query::{self, ListOptions, RestaurantFilter, RestaurantListResponse};
use crate::data::reviews::{self, ReviewListResponse};
use crate::data::users::{self, UpdateProfileOutcome};
use crate::state::AppState;
use crate::uploads::UploadCategory;
use crate::web::auth::extractors::AuthUser;
use crate::web::auth::handlers::normalize_nickname;
use crate::web::PageParams;
use crate::web::error::{ApiError, db_error};

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateMeRequest {
    pub nickname: String,
}

/// `GET /api/me`
pub async fn get_me(AuthUser(user): AuthUser) -> Json<UserResponse> {
    Json(UserResponse::from(&user))
}

/// `PATCH /api/me`. Change the nickname.
#[instrument(skip_all)]
pub async fn update_me(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(body): Json<UpdateMeRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let nickname = normalize_nickname(&body.nickname).map_err(ApiError::bad_request)?;
    match users::update_nickname(&state.db_pool, user.id, &nickname)
        .await
        .map_err(|e| db_error("Update profile", e))?
    {
        UpdateProfileOutcome::Updated(updated) => {
            state.session_cache.refresh_user(&updated);
            Ok(Json(UserResponse::from(&updated)))
        }
        UpdateProfileOutcome::NicknameTaken => Err(ApiError::conflict("Nickname is already taken")),
        UpdateProfileOutcome::NotFound => Err(ApiError::not_found("User not found")),
    }
}

/// `POST /api/me/profile-image`: multipart field `image`. Replaces the old file.
#[instrument(skip_all)]
pub async fn upload_profile_image(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UserResponse>, ApiError> {
    let form = state.uploads.read_multipart(&mut multipart, "image", 1).await?;
    let file = form
        .files
        .first()
        .ok_or_else(|| ApiError::bad_request("image is required"))?;
    let stored = state.uploads.save(UploadCategory::Profiles, file).await?;

    let previous = match users::set_profile_image(&state.db_pool, user.id, &stored.url).await {
        Ok(Some(previous)) => previous,
        Ok(None) => {
            state.uploads.delete(&stored.file_path).await;
            return Err(ApiError::not_found("User not found"));
        }
        Err(e) => {
            state.uploads.delete(&stored.file_path).await;
            return Err(db_error("Set profile image", e));
        }
    };
    if let Some(old) = previous.as_deref().and_then(|url| state.uploads.file_path_from_url(url)) {
        state.uploads.delete(old).await;
    }

    let updated = users::get_user(&state.db_pool, user.id)
        .await
        .map_err(|e| db_error("Reload user", e))?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    state.session_cache.refresh_user(&updated);
    info!(user_id = user.id, "profile image replaced");
    Ok(Json(UserResponse::from(&updated)))
}

/// `GET /api/me/reviews`. Includes hidden reviews with their reason.
#[instrument(skip_all)]
pub async fn my_reviews(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Result<Json<ReviewListResponse>, ApiError> {
    let response =
        reviews::list_user_reviews(&state.db_pool, user.id, params.page, params.per_page).await?;
    Ok(Json(response))
}

/// `GET /api/me/likes`. Liked restaurants, newest restaurants first.
#[instrument(skip_all)]
pub async fn my_likes(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Result<Json<RestaurantListResponse>, ApiError> {
    let filter = RestaurantFilter {
        liked_by: Some(user.id),
        ..Default::default()
    };
    let defaults = ListOptions::default();
    let opts = ListOptions {
        sort: restaurant_query::RestaurantSort::Latest,
        page: params.page.unwrap_or(defaults.page),
        per_page: params.per_page.unwrap_or(defaults.per_page),
        viewer_id: Some(user.id),
    };
    let response = restaurant_query::list_restaurants(&state.db_pool, &filter, &opts)
        .await
        .map_err(|e| db_error("Liked restaurants", e))?;
    Ok(Json(response))
}

/// `GET /api/me/inquiries`
#[instrument(skip_all)]
pub async fn my_inquiries(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Result<Json<InquiryListResponse>, ApiError> {
    let response =
        inquiries::list_inquiries(&state.db_pool, Some(user.id), None, params.page, params.per_page)
            .await
            .map_err(|e| db_error("List my inquiries", e))?;
    Ok(Json(response))
}
