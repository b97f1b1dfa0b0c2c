//! Public restaurant endpoints: search, detail, reviews and likes.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum_extra::extract::Query;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{info, instrument};
use ts_rs::TS;

use crate::data::broadcasts;
use crate::data::restaurant_query::{
    self, DEFAULT_PER_PAGE, ListOptions, RestaurantFilter, RestaurantListResponse, RestaurantSort,
};
use crate::data::restaurants::{self, LikeState, RestaurantDetail};
use crate::data::reviews::{self, ReviewListResponse, ReviewResponse, ReviewSort};
use crate::state::AppState;
use crate::uploads::UploadCategory;
use crate::utils::log_if_slow;
use crate::web::auth::extractors::{AuthUser, MaybeUser};
use crate::web::error::{ApiError, OptionNotFoundExt, db_error};

/// Photos accepted per review.
pub const MAX_REVIEW_PHOTOS: usize = 5;

const SLOW_LIST: Duration = Duration::from_millis(300);

#[derive(Debug, Default, Deserialize, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RestaurantListParams {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub region_id: Option<i32>,
    #[serde(default)]
    pub food_tag_id: Option<i32>,
    /// Repeated query key (`tagIds=1&tagIds=4`); every tag must match.
    #[serde(default)]
    pub tag_ids: Vec<i32>,
    /// Broadcast code such as `TASTY_GUYS`.
    #[serde(default)]
    pub broadcast: Option<String>,
    #[serde(default)]
    pub sort: Option<RestaurantSort>,
    #[serde(default)]
    #[ts(type = "number | null")]
    pub page: Option<i64>,
    #[serde(default)]
    #[ts(type = "number | null")]
    pub per_page: Option<i64>,
}

impl RestaurantListParams {
    /// Resolve ids and codes into a query filter. Unknown food tags or
    /// broadcast codes are client errors rather than empty results.
    pub async fn resolve(
        &self,
        state: &AppState,
        viewer_id: Option<i32>,
    ) -> Result<(RestaurantFilter, ListOptions), ApiError> {
        let food_path = match self.food_tag_id {
            Some(tag_id) => Some(
                restaurants::food_tag_path(&state.db_pool, tag_id)
                    .await
                    .map_err(|e| db_error("Food tag lookup", e))?
                    .ok_or_else(|| ApiError::bad_request(format!("Unknown food tag {tag_id}")))?,
            ),
            None => None,
        };

        let broadcast_id = match self.broadcast.as_deref().filter(|c| !c.is_empty()) {
            Some(code) => Some(
                broadcasts::get_by_code(&state.db_pool, code)
                    .await
                    .map_err(|e| db_error("Broadcast lookup", e))?
                    .ok_or_else(|| ApiError::bad_request(format!("Unknown broadcast {code}")))?
                    .id,
            ),
            None => None,
        };

        let filter = RestaurantFilter {
            query: self.q.clone(),
            region_id: self.region_id,
            food_path,
            tag_ids: self.tag_ids.clone(),
            broadcast_id,
            ..Default::default()
        };
        let opts = ListOptions {
            sort: self.sort.unwrap_or_default(),
            page: self.page.unwrap_or(1),
            per_page: self.per_page.unwrap_or(DEFAULT_PER_PAGE),
            viewer_id,
        };
        Ok((filter, opts))
    }
}

#[derive(Debug, Default, Deserialize, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ReviewListParams {
    #[serde(default)]
    pub sort: Option<ReviewSort>,
    #[serde(default)]
    #[ts(type = "number | null")]
    pub page: Option<i64>,
    #[serde(default)]
    #[ts(type = "number | null")]
    pub per_page: Option<i64>,
}

/// `GET /api/restaurants`
#[instrument(skip_all)]
pub async fn list_restaurants(
    viewer: MaybeUser,
    State(state): State<AppState>,
    Query(params): Query<RestaurantListParams>,
) -> Result<Json<RestaurantListResponse>, ApiError> {
    let start = Instant::now();
    let (filter, opts) = params.resolve(&state, viewer.id()).await?;
    let response = restaurant_query::list_restaurants(&state.db_pool, &filter, &opts)
        .await
        .map_err(|e| db_error("Restaurant search", e))?;
    log_if_slow(start, SLOW_LIST, "restaurant search");
    Ok(Json(response))
}

/// `GET /api/restaurants/{id}`. Admins can see hidden restaurants.
#[instrument(skip_all, fields(restaurant_id = id))]
pub async fn get_restaurant(
    viewer: MaybeUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<RestaurantDetail>, ApiError> {
    let include_hidden = viewer.0.as_ref().is_some_and(|u| u.is_admin());
    let detail = restaurants::get_restaurant_detail(&state.db_pool, id, viewer.id(), include_hidden)
        .await
        .map_err(|e| db_error("Restaurant detail", e))?
        .or_not_found("Restaurant", id)?;
    Ok(Json(detail))
}

/// Fail with 404 unless the restaurant exists and is visible.
async fn require_visible_restaurant(state: &AppState, id: i32) -> Result<(), ApiError> {
    let restaurant = restaurants::get_restaurant(&state.db_pool, id)
        .await
        .map_err(|e| db_error("Restaurant lookup", e))?;
    match restaurant {
        Some(r) if !r.is_hidden => Ok(()),
        _ => Err(ApiError::not_found(format!("Restaurant {id} not found"))),
    }
}

/// `GET /api/restaurants/{id}/reviews`. Visible reviews only.
#[instrument(skip_all, fields(restaurant_id = id))]
pub async fn list_restaurant_reviews(
    viewer: MaybeUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Query(params): Query<ReviewListParams>,
) -> Result<Json<ReviewListResponse>, ApiError> {
    require_visible_restaurant(&state, id).await?;
    let response = reviews::list_restaurant_reviews(
        &state.db_pool,
        id,
        viewer.id(),
        params.sort.unwrap_or_default(),
        params.page,
        params.per_page,
    )
    .await?;
    Ok(Json(response))
}

/// `POST /api/restaurants/{id}/reviews`: multipart `rating`, `content`, `photos`.
#[instrument(skip_all, fields(restaurant_id = id))]
pub async fn create_review(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ReviewResponse>), ApiError> {
    let form = state
        .uploads
        .read_multipart(&mut multipart, "photos", MAX_REVIEW_PHOTOS)
        .await?;

    let rating: i16 = form
        .field("rating")
        .map(str::trim)
        .ok_or_else(|| ApiError::bad_request("rating is required"))?
        .parse()
        .map_err(|_| ApiError::bad_request("rating must be a number"))?;
    let content = form.field("content").unwrap_or_default();
    // Reject bad input before anything is written to disk.
    reviews::validate_review(rating, content)?;

    let stored = state.uploads.save_all(UploadCategory::Reviews, &form.files).await?;
    let photos: Vec<(String, String)> = stored
        .iter()
        .map(|s| (s.url.clone(), s.file_path.clone()))
        .collect();

    match reviews::create_review(&state.db_pool, user.id, id, rating, content, &photos).await {
        Ok(review) => {
            info!(review_id = review.id, user_id = user.id, photos = photos.len(), "review created");
            Ok((StatusCode::CREATED, Json(review)))
        }
        Err(e) => {
            state
                .uploads
                .delete_all(stored.iter().map(|s| s.file_path.as_str()).collect::<Vec<&str>>())
                .await;
            Err(e.into())
        }
    }
}

/// `POST /api/restaurants/{id}/like`
#[instrument(skip_all, fields(restaurant_id = id))]
pub async fn like_restaurant(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<LikeState>, ApiError> {
    let like = restaurants::like_restaurant(&state.db_pool, user.id, id)
        .await
        .map_err(|e| db_error("Like restaurant", e))?
        .or_not_found("Restaurant", id)?;
    Ok(Json(like))
}

/// `DELETE /api/restaurants/{id}/like`
#[instrument(skip_all, fields(restaurant_id = id))]
pub async fn unlike_restaurant(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<LikeState>, ApiError> {
    let like = restaurants::unlike_restaurant(&state.db_pool, user.id, id)
        .await
        .map_err(|e| db_error("Unlike restaurant", e))?
        .or_not_found("Restaurant", id)?;
    Ok(Json(like))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::FromRequestParts;

    async fn parse(query: &str) -> RestaurantListParams {
        let request = axum::http::Request::builder()
            .uri(format!("/api/restaurants?{query}"))
            .body(())
            .unwrap();
        let (mut parts, ()) = request.into_parts();
        Query::<RestaurantListParams>::from_request_parts(&mut parts, &())
            .await
            .unwrap()
            .0
    }

    #[tokio::test]
    async fn test_list_params_repeated_tag_ids() {
        let params =
            parse("q=%EA%B5%AD%EB%B0%A5&tagIds=3&tagIds=7&regionId=11&sort=popular&perPage=5").await;
        assert_eq!(params.q.as_deref(), Some("국밥"));
        assert_eq!(params.tag_ids, vec![3, 7]);
        assert_eq!(params.region_id, Some(11));
        assert_eq!(params.sort, Some(RestaurantSort::Popular));
        assert_eq!(params.per_page, Some(5));
        assert_eq!(params.page, None);
    }

    #[tokio::test]
    async fn test_list_params_defaults() {
        let params = parse("").await;
        assert!(params.tag_ids.is_empty());
        assert!(params.food_tag_id.is_none());
        assert!(params.sort.is_none());
    }
}
