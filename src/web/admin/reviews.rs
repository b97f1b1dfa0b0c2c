//! Review moderation.

use axum::extract::{Path, State};
use axum::response::Json;
use axum_extra::extract::Query;
use serde::Deserialize;
use tracing::{info, instrument};
use ts_rs::TS;

use crate::data::reviews::{self, ReviewFilter, ReviewListResponse, ReviewResponse, ReviewSort};
use crate::state::AppState;
use crate::web::auth::extractors::AdminUser;
use crate::web::error::{ApiError, OptionNotFoundExt};

const MAX_REASON_CHARS: usize = 200;

#[derive(Debug, Default, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AdminReviewParams {
    #[serde(default)]
    pub restaurant_id: Option<i32>,
    #[serde(default)]
    pub user_id: Option<i32>,
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub hidden: Option<bool>,
    #[serde(default)]
    pub sort: Option<ReviewSort>,
    #[serde(default)]
    #[ts(type = "number | null")]
    pub page: Option<i64>,
    #[serde(default)]
    #[ts(type = "number | null")]
    pub per_page: Option<i64>,
}

/// `GET /api/admin/reviews`
#[instrument(skip_all)]
pub async fn list(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Query(params): Query<AdminReviewParams>,
) -> Result<Json<ReviewListResponse>, ApiError> {
    let filter = ReviewFilter {
        restaurant_id: params.restaurant_id,
        user_id: params.user_id,
        query: params.q,
        hidden: params.hidden,
    };
    let response = reviews::list_reviews(
        &state.db_pool,
        &filter,
        Some(admin.id),
        params.sort.unwrap_or_default(),
        params.page,
        params.per_page,
    )
    .await?;
    Ok(Json(response))
}

#[derive(Debug, Default, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct HideReviewBody {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Trimmed reason, `None` when blank.
fn normalize_reason(reason: Option<String>) -> Result<Option<String>, ApiError> {
    let Some(reason) = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    if reason.chars().count() > MAX_REASON_CHARS {
        return Err(ApiError::bad_request(format!(
            "reason must be at most {MAX_REASON_CHARS} characters"
        )));
    }
    Ok(Some(reason))
}

async fn set_hidden(
    state: &AppState,
    admin_id: i32,
    id: i32,
    hidden: bool,
    reason: Option<&str>,
) -> Result<Json<ReviewResponse>, ApiError> {
    let changed = reviews::set_review_hidden(&state.db_pool, id, hidden, reason).await?;
    if changed {
        info!(admin_id, review_id = id, hidden, "review moderated");
    }
    let review = reviews::get_review(&state.db_pool, id, Some(admin_id))
        .await?
        .or_not_found("Review", id)?;
    Ok(Json(review))
}

/// `POST /api/admin/reviews/{id}/hide`. Hidden reviews stop counting toward the rating.
#[instrument(skip_all, fields(review_id = id))]
pub async fn hide(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    body: Option<Json<HideReviewBody>>,
) -> Result<Json<ReviewResponse>, ApiError> {
    let reason = normalize_reason(body.and_then(|Json(b)| b.reason))?;
    set_hidden(&state, admin.id, id, true, reason.as_deref()).await
}

/// `POST /api/admin/reviews/{id}/show`
#[instrument(skip_all, fields(review_id = id))]
pub async fn show(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ReviewResponse>, ApiError> {
    set_hidden(&state, admin.id, id, false, None).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_reason() {
        assert_eq!(normalize_reason(None).unwrap(), None);
        assert_eq!(normalize_reason(Some("   ".into())).unwrap(), None);
        assert_eq!(
            normalize_reason(Some(" 광고성 리뷰 ".into())).unwrap().as_deref(),
            Some("광고성 리뷰")
        );
        assert!(normalize_reason(Some("가".repeat(MAX_REASON_CHARS + 1))).is_err());
    }
}
