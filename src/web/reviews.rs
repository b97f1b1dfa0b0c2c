//! Review edit, delete and like endpoints. Creation lives under restaurants.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use tracing::{info, instrument};
use ts_rs::TS;

use crate::data::restaurants::LikeState;
use crate::data::reviews::{self, ReviewResponse};
use crate::state::AppState;
use crate::web::auth::extractors::AuthUser;
use crate::web::error::ApiError;

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateReviewRequest {
    #[serde(default)]
    pub rating: Option<i16>,
    #[serde(default)]
    pub content: Option<String>,
}

/// `PATCH /api/reviews/{id}`. Author or admin.
#[instrument(skip_all, fields(review_id = id))]
pub async fn update_review(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(body): Json<UpdateReviewRequest>,
) -> Result<Json<ReviewResponse>, ApiError> {
    if body.rating.is_none() && body.content.is_none() {
        return Err(ApiError::bad_request("Nothing to update"));
    }
    let review = reviews::update_review(
        &state.db_pool,
        auth.actor(),
        id,
        body.rating,
        body.content.as_deref(),
    )
    .await?;
    Ok(Json(review))
}

/// `DELETE /api/reviews/{id}`. Author or admin. Photo files are removed afterwards.
#[instrument(skip_all, fields(review_id = id))]
pub async fn delete_review(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    let files = reviews::delete_review(&state.db_pool, auth.actor(), id).await?;
    state.uploads.delete_all(files.iter().map(String::as_str)).await;
    info!(user_id = auth.0.id, photos = files.len(), "review deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/reviews/{id}/like`
#[instrument(skip_all, fields(review_id = id))]
pub async fn like_review(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<LikeState>, ApiError> {
    Ok(Json(reviews::set_review_like(&state.db_pool, user.id, id, true).await?))
}

/// `DELETE /api/reviews/{id}/like`
#[instrument(skip_all, fields(review_id = id))]
pub async fn unlike_review(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<LikeState>, ApiError> {
    Ok(Json(reviews::set_review_like(&state.db_pool, user.id, id, false).await?))
}
