//! User inquiries (support tickets).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use tracing::{info, instrument};

use crate::data::inquiries::{self, Inquiry, NewInquiry};
use crate::state::AppState;
use crate::web::auth::extractors::AuthUser;
use crate::web::error::{ApiError, OptionNotFoundExt, db_error};

/// `POST /api/inquiries`
#[instrument(skip_all)]
pub async fn create_inquiry(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(body): Json<NewInquiry>,
) -> Result<(StatusCode, Json<Inquiry>), ApiError> {
    let input = body.normalize().map_err(ApiError::bad_request)?;
    let inquiry = inquiries::create_inquiry(&state.db_pool, user.id, &input)
        .await
        .map_err(|e| db_error("Create inquiry", e))?;
    info!(inquiry_id = inquiry.id, user_id = user.id, category = %inquiry.category, "inquiry created");
    Ok((StatusCode::CREATED, Json(inquiry)))
}

/// `GET /api/inquiries/{id}`. Owner or admin.
#[instrument(skip_all, fields(inquiry_id = id))]
pub async fn get_inquiry(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Inquiry>, ApiError> {
    let inquiry = inquiries::get_inquiry(&state.db_pool, id)
        .await
        .map_err(|e| db_error("Get inquiry", e))?
        .or_not_found("Inquiry", id)?;
    if inquiry.user_id != user.id && !user.is_admin() {
        return Err(ApiError::forbidden("Not your inquiry"));
    }
    Ok(Json(inquiry))
}
