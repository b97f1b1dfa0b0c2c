//! Admin restaurant management: CRUD, tags and photos.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum_extra::extract::Query;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use ts_rs::TS;

use crate::data::models::Photo;
use crate::data::regions;
use crate::data::restaurant_query::{self, RestaurantListResponse};
use crate::data::restaurants::{self, RestaurantDetail, RestaurantInput, TagRef};
use crate::state::AppState;
use crate::uploads::UploadCategory;
use crate::web::auth::extractors::AdminUser;
use crate::web::error::{ApiError, OptionNotFoundExt, db_error, is_unique_violation};
use crate::web::restaurants::RestaurantListParams;

/// Photos accepted per upload request.
pub const MAX_RESTAURANT_PHOTOS: usize = 10;

/// `GET /api/admin/restaurants`. Same filters as the public search, hidden rows included.
#[instrument(skip_all)]
pub async fn list(
    AdminUser(_user): AdminUser,
    State(state): State<AppState>,
    Query(params): Query<RestaurantListParams>,
) -> Result<Json<RestaurantListResponse>, ApiError> {
    let (mut filter, opts) = params.resolve(&state, None).await?;
    filter.include_hidden = true;
    let response = restaurant_query::list_restaurants(&state.db_pool, &filter, &opts)
        .await
        .map_err(|e| db_error("Admin restaurant search", e))?;
    Ok(Json(response))
}

/// Fill in region and coordinates the admin left blank.
async fn enrich_input(state: &AppState, input: &mut RestaurantInput) -> Result<(), ApiError> {
    if input.region_id.is_none() {
        input.region_id = regions::resolve_from_address(&state.db_pool, &input.address)
            .await
            .map_err(|e| db_error("Region lookup", e))?;
    }

    let missing_coords = input.latitude.is_none() || input.longitude.is_none();
    if missing_coords && state.kakao.is_configured() {
        let address = input.road_address.as_deref().unwrap_or(&input.address);
        match state.kakao.geocode(address).await {
            Ok(Some((lat, lng))) => {
                debug!(lat, lng, "geocoded restaurant address");
                input.latitude = Some(lat);
                input.longitude = Some(lng);
            }
            Ok(None) => debug!(address, "address not found by geocoder"),
            Err(e) => warn!(error = %e, "geocoding failed, saving without coordinates"),
        }
    }
    Ok(())
}

fn write_error(context: &str, e: anyhow::Error) -> ApiError {
    if is_unique_violation(&e) {
        ApiError::conflict("Kakao place id is already linked to another restaurant")
    } else {
        db_error(context, e)
    }
}

async fn load_detail(state: &AppState, id: i32) -> Result<RestaurantDetail, ApiError> {
    restaurants::get_restaurant_detail(&state.db_pool, id, None, true)
        .await
        .map_err(|e| db_error("Restaurant detail", e))?
        .or_not_found("Restaurant", id)
}

/// `POST /api/admin/restaurants`
#[instrument(skip_all)]
pub async fn create(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Json(mut input): Json<RestaurantInput>,
) -> Result<(StatusCode, Json<RestaurantDetail>), ApiError> {
    input.normalize().map_err(ApiError::bad_request)?;
    enrich_input(&state, &mut input).await?;

    let restaurant = restaurants::create_restaurant(&state.db_pool, &input)
        .await
        .map_err(|e| write_error("Create restaurant", e))?;
    info!(admin_id = admin.id, restaurant_id = restaurant.id, name = %restaurant.name, "restaurant created");

    Ok((StatusCode::CREATED, Json(load_detail(&state, restaurant.id).await?)))
}

/// `PUT /api/admin/restaurants/{id}`
#[instrument(skip_all, fields(restaurant_id = id))]
pub async fn update(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(mut input): Json<RestaurantInput>,
) -> Result<Json<RestaurantDetail>, ApiError> {
    input.normalize().map_err(ApiError::bad_request)?;
    enrich_input(&state, &mut input).await?;

    restaurants::update_restaurant(&state.db_pool, id, &input)
        .await
        .map_err(|e| write_error("Update restaurant", e))?
        .or_not_found("Restaurant", id)?;
    info!(admin_id = admin.id, restaurant_id = id, "restaurant updated");

    Ok(Json(load_detail(&state, id).await?))
}

/// `DELETE /api/admin/restaurants/{id}`. Removes reviews, photos and their files.
#[instrument(skip_all, fields(restaurant_id = id))]
pub async fn delete(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    let files = restaurants::delete_restaurant(&state.db_pool, id)
        .await
        .map_err(|e| db_error("Delete restaurant", e))?
        .or_not_found("Restaurant", id)?;
    state.uploads.delete_all(files.iter().map(String::as_str)).await;
    info!(admin_id = admin.id, restaurant_id = id, files = files.len(), "restaurant deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SetTagsBody {
    pub tag_ids: Vec<i32>,
}

/// `PUT /api/admin/restaurants/{id}/tags`. Replace the tag set.
#[instrument(skip_all, fields(restaurant_id = id))]
pub async fn set_tags(
    AdminUser(_user): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(body): Json<SetTagsBody>,
) -> Result<Json<Vec<TagRef>>, ApiError> {
    restaurants::get_restaurant(&state.db_pool, id)
        .await
        .map_err(|e| db_error("Restaurant lookup", e))?
        .or_not_found("Restaurant", id)?;

    let mut tag_ids = body.tag_ids;
    tag_ids.sort_unstable();
    tag_ids.dedup();
    let tags = restaurants::set_restaurant_tags(&state.db_pool, id, &tag_ids)
        .await
        .map_err(|e| db_error("Set restaurant tags", e))?;
    Ok(Json(tags))
}

/// `POST /api/admin/restaurants/{id}/photos`: multipart field `photos`.
#[instrument(skip_all, fields(restaurant_id = id))]
pub async fn add_photos(
    AdminUser(_user): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Vec<Photo>>), ApiError> {
    restaurants::get_restaurant(&state.db_pool, id)
        .await
        .map_err(|e| db_error("Restaurant lookup", e))?
        .or_not_found("Restaurant", id)?;

    let form = state
        .uploads
        .read_multipart(&mut multipart, "photos", MAX_RESTAURANT_PHOTOS)
        .await?;
    if form.files.is_empty() {
        return Err(ApiError::bad_request("at least one photo is required"));
    }

    let stored = state.uploads.save_all(UploadCategory::Restaurants, &form.files).await?;
    let files: Vec<(String, String)> = stored
        .iter()
        .map(|s| (s.url.clone(), s.file_path.clone()))
        .collect();

    match restaurants::add_photos(&state.db_pool, id, &files).await {
        Ok(photos) => {
            info!(restaurant_id = id, count = photos.len(), "restaurant photos added");
            Ok((StatusCode::CREATED, Json(photos)))
        }
        Err(e) => {
            state
                .uploads
                .delete_all(stored.iter().map(|s| s.file_path.as_str()).collect::<Vec<&str>>())
                .await;
            Err(db_error("Add restaurant photos", e))
        }
    }
}

/// `DELETE /api/admin/restaurants/{id}/photos/{photo_id}`
#[instrument(skip_all, fields(restaurant_id = id, photo_id = photo_id))]
pub async fn delete_photo(
    AdminUser(_user): AdminUser,
    State(state): State<AppState>,
    Path((id, photo_id)): Path<(i32, i32)>,
) -> Result<StatusCode, ApiError> {
    let file_path = restaurants::delete_photo(&state.db_pool, id, photo_id)
        .await
        .map_err(|e| db_error("Delete restaurant photo", e))?
        .or_not_found("Photo", photo_id)?;
    state.uploads.delete(&file_path).await;
    Ok(StatusCode::NO_CONTENT)
}
