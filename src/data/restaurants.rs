//! Restaurant records: detail views, admin CRUD, tags, photos and likes.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use ts_rs::TS;

use super::models::{Photo, Region, TagType};
use super::ranking::{self, average_rating, bayesian_score};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Restaurant {
    pub id: i32,
    pub name: String,
    pub address: String,
    pub road_address: Option<String>,
    pub region_id: Option<i32>,
    pub phone: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub kakao_place_id: Option<String>,
    pub main_menu: Option<String>,
    pub description: Option<String>,
    pub rating_sum: i64,
    pub review_count: i32,
    pub like_count: i32,
    pub is_hidden: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub(crate) const RESTAURANT_COLUMNS: &str = "id, name, address, road_address, region_id, phone, \
    latitude, longitude, kakao_place_id, main_menu, description, rating_sum, review_count, \
    like_count, is_hidden, created_at, updated_at";

#[derive(Debug, Clone, Serialize, sqlx::FromRow, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TagRef {
    pub id: i32,
    pub name: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub tag_type: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct BroadcastAppearance {
    pub broadcast_code: String,
    pub broadcast_name: String,
    pub episode_no: i32,
    pub air_date: Option<NaiveDate>,
    pub menu: Option<String>,
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RestaurantDetail {
    pub id: i32,
    pub name: String,
    pub address: String,
    pub road_address: Option<String>,
    /// Region chain from the top-level region down.
    pub regions: Vec<Region>,
    pub phone: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub kakao_place_id: Option<String>,
    pub main_menu: Option<String>,
    pub description: Option<String>,
    pub average_rating: Option<f64>,
    pub score: f64,
    pub review_count: i32,
    pub like_count: i32,
    pub liked_by_me: bool,
    pub is_hidden: bool,
    pub tags: Vec<TagRef>,
    pub photos: Vec<Photo>,
    pub broadcasts: Vec<BroadcastAppearance>,
    pub created_at: DateTime<Utc>,
}

/// Editable restaurant fields supplied by admins.
#[derive(Debug, Clone, Default, Deserialize, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RestaurantInput {
    pub name: String,
    #[serde(default)]
    pub address: String,
    pub road_address: Option<String>,
    pub region_id: Option<i32>,
    pub phone: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub kakao_place_id: Option<String>,
    pub main_menu: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub is_hidden: bool,
}

impl RestaurantInput {
    /// Validate and normalize in place, returning a user-facing message on failure.
    pub fn normalize(&mut self) -> Result<(), String> {
        self.name = self.name.trim().to_string();
        self.address = self.address.trim().to_string();
        if self.name.is_empty() {
            return Err("name is required".into());
        }
        if self.name.chars().count() > 100 {
            return Err("name must be at most 100 characters".into());
        }
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => {
                if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
                    return Err("coordinates out of range".into());
                }
            }
            (None, None) => {}
            _ => return Err("latitude and longitude must be given together".into()),
        }
        for field in [
            &mut self.road_address,
            &mut self.phone,
            &mut self.kakao_place_id,
            &mut self.main_menu,
            &mut self.description,
        ] {
            if field.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *field = None;
            }
        }
        Ok(())
    }
}

pub async fn get_restaurant(pool: &PgPool, id: i32) -> Result<Option<Restaurant>> {
    sqlx::query_as::<_, Restaurant>(&format!(
        "SELECT {RESTAURANT_COLUMNS} FROM restaurants WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch restaurant")
}

/// Full detail view. Hidden restaurants are only returned when `include_hidden`.
pub async fn get_restaurant_detail(
    pool: &PgPool,
    id: i32,
    viewer_id: Option<i32>,
    include_hidden: bool,
) -> Result<Option<RestaurantDetail>> {
    let Some(r) = get_restaurant(pool, id).await? else {
        return Ok(None);
    };
    if r.is_hidden && !include_hidden {
        return Ok(None);
    }

    let regions = match r.region_id {
        Some(region_id) => sqlx::query_as::<_, Region>(
            "WITH RECURSIVE chain AS ( \
                SELECT id, name, parent_id, depth FROM regions WHERE id = $1 \
                UNION ALL \
                SELECT g.id, g.name, g.parent_id, g.depth FROM regions g \
                JOIN chain c ON g.id = c.parent_id \
             ) SELECT id, name, parent_id, depth FROM chain ORDER BY depth",
        )
        .bind(region_id)
        .fetch_all(pool)
        .await
        .context("failed to load region chain")?,
        None => Vec::new(),
    };

    let tags = sqlx::query_as::<_, TagRef>(
        "SELECT t.id, t.name, t.type FROM restaurant_tags rt JOIN tags t ON t.id = rt.tag_id \
         WHERE rt.restaurant_id = $1 ORDER BY t.type, t.path, t.name",
    )
    .bind(id)
    .fetch_all(pool)
    .await
    .context("failed to load restaurant tags")?;

    let photos = list_photos(pool, id).await?;

    let broadcasts = sqlx::query_as::<_, BroadcastAppearance>(
        "SELECT b.code AS broadcast_code, b.name AS broadcast_name, be.episode_no, be.air_date, br.menu \
         FROM broadcast_restaurants br \
         JOIN broadcast_episodes be ON be.id = br.episode_id \
         JOIN broadcasts b ON b.id = be.broadcast_id \
         WHERE br.restaurant_id = $1 ORDER BY be.episode_no DESC",
    )
    .bind(id)
    .fetch_all(pool)
    .await
    .context("failed to load broadcast appearances")?;

    let liked_by_me = match viewer_id {
        Some(user_id) => {
            let (liked,): (bool,) = sqlx::query_as(
                "SELECT EXISTS (SELECT 1 FROM restaurant_likes WHERE user_id = $1 AND restaurant_id = $2)",
            )
            .bind(user_id)
            .bind(id)
            .fetch_one(pool)
            .await
            .context("failed to check restaurant like")?;
            liked
        }
        None => false,
    };

    let prior_mean = ranking::global_mean(pool).await?;

    Ok(Some(RestaurantDetail {
        average_rating: average_rating(r.rating_sum, r.review_count),
        score: bayesian_score(r.rating_sum, r.review_count, prior_mean),
        id: r.id,
        name: r.name,
        address: r.address,
        road_address: r.road_address,
        regions,
        phone: r.phone,
        latitude: r.latitude,
        longitude: r.longitude,
        kakao_place_id: r.kakao_place_id,
        main_menu: r.main_menu,
        description: r.description,
        review_count: r.review_count,
        like_count: r.like_count,
        liked_by_me,
        is_hidden: r.is_hidden,
        tags,
        photos,
        broadcasts,
        created_at: r.created_at,
    }))
}

pub async fn create_restaurant(pool: &PgPool, input: &RestaurantInput) -> Result<Restaurant> {
    sqlx::query_as::<_, Restaurant>(&format!(
        "INSERT INTO restaurants (name, address, road_address, region_id, phone, latitude, longitude, \
         kakao_place_id, main_menu, description, is_hidden) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING {RESTAURANT_COLUMNS}"
    ))
    .bind(&input.name)
    .bind(&input.address)
    .bind(&input.road_address)
    .bind(input.region_id)
    .bind(&input.phone)
    .bind(input.latitude)
    .bind(input.longitude)
    .bind(&input.kakao_place_id)
    .bind(&input.main_menu)
    .bind(&input.description)
    .bind(input.is_hidden)
    .fetch_one(pool)
    .await
    .context("failed to insert restaurant")
}

/// Overwrite editable fields. Aggregates are never touched here.
pub async fn update_restaurant(
    pool: &PgPool,
    id: i32,
    input: &RestaurantInput,
) -> Result<Option<Restaurant>> {
    sqlx::query_as::<_, Restaurant>(&format!(
        "UPDATE restaurants SET name = $2, address = $3, road_address = $4, region_id = $5, \
         phone = $6, latitude = $7, longitude = $8, kakao_place_id = $9, main_menu = $10, \
         description = $11, is_hidden = $12, updated_at = now() \
         WHERE id = $1 RETURNING {RESTAURANT_COLUMNS}"
    ))
    .bind(id)
    .bind(&input.name)
    .bind(&input.address)
    .bind(&input.road_address)
    .bind(input.region_id)
    .bind(&input.phone)
    .bind(input.latitude)
    .bind(input.longitude)
    .bind(&input.kakao_place_id)
    .bind(&input.main_menu)
    .bind(&input.description)
    .bind(input.is_hidden)
    .fetch_optional(pool)
    .await
    .context("failed to update restaurant")
}

/// Delete a restaurant, returning the on-disk paths of every photo that went with it.
pub async fn delete_restaurant(pool: &PgPool, id: i32) -> Result<Option<Vec<String>>> {
    let mut tx = pool.begin().await?;
    let files: Vec<(String,)> = sqlx::query_as(
        "SELECT file_path FROM restaurant_photos WHERE restaurant_id = $1 \
         UNION ALL \
         SELECT rp.file_path FROM review_photos rp JOIN reviews rv ON rv.id = rp.review_id \
         WHERE rv.restaurant_id = $1",
    )
    .bind(id)
    .fetch_all(&mut *tx)
    .await
    .context("failed to collect restaurant photo files")?;

    let deleted = sqlx::query("DELETE FROM restaurants WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("failed to delete restaurant")?
        .rows_affected();
    tx.commit().await?;

    Ok((deleted > 0).then(|| files.into_iter().map(|(p,)| p).collect()))
}

/// Replace a restaurant's tag set. Unknown tag ids are ignored.
pub async fn set_restaurant_tags(pool: &PgPool, id: i32, tag_ids: &[i32]) -> Result<Vec<TagRef>> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM restaurant_tags WHERE restaurant_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("failed to clear restaurant tags")?;
    sqlx::query(
        "INSERT INTO restaurant_tags (restaurant_id, tag_id) \
         SELECT $1, t.id FROM tags t WHERE t.id = ANY($2) ON CONFLICT DO NOTHING",
    )
    .bind(id)
    .bind(tag_ids)
    .execute(&mut *tx)
    .await
    .context("failed to insert restaurant tags")?;
    sqlx::query("UPDATE restaurants SET updated_at = now() WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    sqlx::query_as::<_, TagRef>(
        "SELECT t.id, t.name, t.type FROM restaurant_tags rt JOIN tags t ON t.id = rt.tag_id \
         WHERE rt.restaurant_id = $1 ORDER BY t.type, t.path, t.name",
    )
    .bind(id)
    .fetch_all(pool)
    .await
    .context("failed to reload restaurant tags")
}

/// Resolve a food tag id to its path, for subtree filtering.
pub async fn food_tag_path(pool: &PgPool, tag_id: i32) -> Result<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT path FROM tags WHERE id = $1 AND type = $2")
        .bind(tag_id)
        .bind(TagType::Food.as_str())
        .fetch_optional(pool)
        .await
        .context("failed to resolve food tag path")?;
    Ok(row.map(|(p,)| p))
}

pub async fn list_photos(pool: &PgPool, restaurant_id: i32) -> Result<Vec<Photo>> {
    sqlx::query_as::<_, Photo>(
        "SELECT id, url, file_path, sort_order FROM restaurant_photos \
         WHERE restaurant_id = $1 ORDER BY sort_order, id",
    )
    .bind(restaurant_id)
    .fetch_all(pool)
    .await
    .context("failed to list restaurant photos")
}

/// Append photos after the current last one.
pub async fn add_photos(
    pool: &PgPool,
    restaurant_id: i32,
    files: &[(String, String)],
) -> Result<Vec<Photo>> {
    let mut tx = pool.begin().await?;
    let (next,): (i32,) = sqlx::query_as(
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM restaurant_photos WHERE restaurant_id = $1",
    )
    .bind(restaurant_id)
    .fetch_one(&mut *tx)
    .await?;

    let mut photos = Vec::with_capacity(files.len());
    for (offset, (url, file_path)) in files.iter().enumerate() {
        let photo = sqlx::query_as::<_, Photo>(
            "INSERT INTO restaurant_photos (restaurant_id, url, file_path, sort_order) \
             VALUES ($1, $2, $3, $4) RETURNING id, url, file_path, sort_order",
        )
        .bind(restaurant_id)
        .bind(url)
        .bind(file_path)
        .bind(next + offset as i32)
        .fetch_one(&mut *tx)
        .await
        .context("failed to insert restaurant photo")?;
        photos.push(photo);
    }
    tx.commit().await?;
    Ok(photos)
}

/// Delete one photo, returning its file path.
pub async fn delete_photo(pool: &PgPool, restaurant_id: i32, photo_id: i32) -> Result<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as(
        "DELETE FROM restaurant_photos WHERE id = $1 AND restaurant_id = $2 RETURNING file_path",
    )
    .bind(photo_id)
    .bind(restaurant_id)
    .fetch_optional(pool)
    .await
    .context("failed to delete restaurant photo")?;
    Ok(row.map(|(p,)| p))
}

#[derive(Debug, Clone, Copy, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LikeState {
    pub liked: bool,
    pub like_count: i32,
}

/// Like a visible restaurant. Idempotent; `None` when the restaurant is missing or hidden.
pub async fn like_restaurant(pool: &PgPool, user_id: i32, restaurant_id: i32) -> Result<Option<LikeState>> {
    set_restaurant_like(pool, user_id, restaurant_id, true).await
}

/// Remove a like. Idempotent; `None` when the restaurant is missing or hidden.
pub async fn unlike_restaurant(pool: &PgPool, user_id: i32, restaurant_id: i32) -> Result<Option<LikeState>> {
    set_restaurant_like(pool, user_id, restaurant_id, false).await
}

async fn set_restaurant_like(
    pool: &PgPool,
    user_id: i32,
    restaurant_id: i32,
    liked: bool,
) -> Result<Option<LikeState>> {
    let mut tx = pool.begin().await?;
    let exists: Option<(i32,)> = sqlx::query_as(
        "SELECT like_count FROM restaurants WHERE id = $1 AND NOT is_hidden FOR UPDATE",
    )
    .bind(restaurant_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some((mut like_count,)) = exists else {
        return Ok(None);
    };

    let changed = if liked {
        sqlx::query(
            "INSERT INTO restaurant_likes (user_id, restaurant_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
    } else {
        sqlx::query("DELETE FROM restaurant_likes WHERE user_id = $1 AND restaurant_id = $2")
    }
    .bind(user_id)
    .bind(restaurant_id)
    .execute(&mut *tx)
    .await
    .context("failed to write restaurant like")?
    .rows_affected();

    if changed > 0 {
        let delta = if liked { 1 } else { -1 };
        let (count,): (i32,) = sqlx::query_as(
            "UPDATE restaurants SET like_count = GREATEST(like_count + $2, 0) WHERE id = $1 RETURNING like_count",
        )
        .bind(restaurant_id)
        .bind(delta)
        .fetch_one(&mut *tx)
        .await
        .context("failed to update restaurant like count")?;
        like_count = count;
    }
    tx.commit().await?;

    Ok(Some(LikeState { liked, like_count }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_trims_and_blanks() {
        let mut input = RestaurantInput {
            name: "  을지면옥 ".into(),
            address: " 서울 중구 ".into(),
            phone: Some("  ".into()),
            main_menu: Some("평양냉면".into()),
            ..Default::default()
        };
        input.normalize().unwrap();
        assert_eq!(input.name, "을지면옥");
        assert_eq!(input.address, "서울 중구");
        assert_eq!(input.phone, None);
        assert_eq!(input.main_menu.as_deref(), Some("평양냉면"));
    }

    #[test]
    fn test_normalize_rejects_bad_input() {
        let mut empty = RestaurantInput::default();
        assert!(empty.normalize().is_err());

        let mut half_coords = RestaurantInput {
            name: "a".into(),
            latitude: Some(37.5),
            ..Default::default()
        };
        assert!(half_coords.normalize().is_err());

        let mut out_of_range = RestaurantInput {
            name: "a".into(),
            latitude: Some(137.5),
            longitude: Some(127.0),
            ..Default::default()
        };
        assert!(out_of_range.normalize().is_err());
    }
}
