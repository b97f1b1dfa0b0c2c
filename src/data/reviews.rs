//! Reviews and the restaurant rating aggregates they drive.
//!
//! `restaurants.rating_sum` and `restaurants.review_count` always equal the
//! sum and count over the restaurant's *visible* reviews. Every mutation below
//! runs in one transaction holding row locks on the review (when it exists)
//! and then on the restaurant, and adjusts the aggregates only when the
//! review's visibility makes it count.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use ts_rs::TS;

use super::restaurant_query::like_pattern;
use super::restaurants::LikeState;
use crate::utils::paginate;

pub const MIN_RATING: i16 = 1;
pub const MAX_RATING: i16 = 5;
pub const MAX_CONTENT_CHARS: usize = 2000;
const DEFAULT_PER_PAGE: i64 = 10;
const MAX_PER_PAGE: i64 = 50;

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("review not found")]
    NotFound,
    #[error("restaurant not found")]
    RestaurantNotFound,
    #[error("not allowed to modify this review")]
    Forbidden,
    #[error("invalid review: {0}")]
    Invalid(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Who is performing a review mutation.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub user_id: i32,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ReviewPhoto {
    pub id: i32,
    pub url: String,
    pub sort_order: i32,
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ReviewAuthor {
    pub id: i32,
    pub nickname: String,
    pub profile_image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ReviewResponse {
    pub id: i32,
    pub restaurant_id: i32,
    pub restaurant_name: String,
    pub author: ReviewAuthor,
    pub rating: i16,
    pub content: String,
    pub photos: Vec<ReviewPhoto>,
    pub like_count: i32,
    pub liked_by_me: bool,
    pub is_hidden: bool,
    pub hidden_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ReviewListResponse {
    pub reviews: Vec<ReviewResponse>,
    #[ts(type = "number")]
    pub total: i64,
    #[ts(type = "number")]
    pub page: i64,
    #[ts(type = "number")]
    pub per_page: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ReviewSort {
    #[default]
    Latest,
    RatingDesc,
    RatingAsc,
    Likes,
}

impl ReviewSort {
    fn order_by(self) -> &'static str {
        match self {
            Self::Latest => "rv.created_at DESC, rv.id DESC",
            Self::RatingDesc => "rv.rating DESC, rv.created_at DESC, rv.id DESC",
            Self::RatingAsc => "rv.rating ASC, rv.created_at DESC, rv.id DESC",
            Self::Likes => "rv.like_count DESC, rv.created_at DESC, rv.id DESC",
        }
    }
}

#[derive(sqlx::FromRow)]
struct ReviewRow {
    id: i32,
    restaurant_id: i32,
    restaurant_name: String,
    user_id: i32,
    nickname: String,
    profile_image_url: Option<String>,
    rating: i16,
    content: String,
    photos: Json<Vec<ReviewPhoto>>,
    like_count: i32,
    liked_by_me: bool,
    is_hidden: bool,
    hidden_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ReviewRow> for ReviewResponse {
    fn from(row: ReviewRow) -> Self {
        Self {
            id: row.id,
            restaurant_id: row.restaurant_id,
            restaurant_name: row.restaurant_name,
            author: ReviewAuthor {
                id: row.user_id,
                nickname: row.nickname,
                profile_image_url: row.profile_image_url,
            },
            rating: row.rating,
            content: row.content,
            photos: row.photos.0,
            like_count: row.like_count,
            liked_by_me: row.liked_by_me,
            is_hidden: row.is_hidden,
            hidden_reason: row.hidden_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const REVIEW_COLUMNS: &str = "rv.id, rv.restaurant_id, r.name AS restaurant_name, \
    rv.user_id, u.nickname, u.profile_image_url, rv.rating, rv.content, \
    COALESCE((SELECT json_agg(json_build_object('id', p.id, 'url', p.url, 'sortOrder', p.sort_order) \
        ORDER BY p.sort_order, p.id) FROM review_photos p WHERE p.review_id = rv.id), '[]'::json) AS photos, \
    rv.like_count, rv.is_hidden, rv.hidden_reason, rv.created_at, rv.updated_at";

const REVIEW_FROM: &str =
    " FROM reviews rv JOIN restaurants r ON r.id = rv.restaurant_id JOIN users u ON u.id = rv.user_id";

/// Filters for review listings; unset fields do not constrain.
#[derive(Debug, Clone, Default)]
pub struct ReviewFilter {
    pub restaurant_id: Option<i32>,
    pub user_id: Option<i32>,
    pub query: Option<String>,
    pub hidden: Option<bool>,
}

fn push_select(qb: &mut QueryBuilder<'static, Postgres>, viewer_id: Option<i32>) {
    qb.push("SELECT ");
    qb.push(REVIEW_COLUMNS);
    qb.push(", EXISTS (SELECT 1 FROM review_likes l WHERE l.review_id = rv.id AND l.user_id = ");
    qb.push_bind(viewer_id);
    qb.push(") AS liked_by_me");
    qb.push(REVIEW_FROM);
}

fn push_filter(qb: &mut QueryBuilder<'static, Postgres>, filter: &ReviewFilter) {
    qb.push(" WHERE TRUE");
    if let Some(id) = filter.restaurant_id {
        qb.push(" AND rv.restaurant_id = ").push_bind(id);
    }
    if let Some(id) = filter.user_id {
        qb.push(" AND rv.user_id = ").push_bind(id);
    }
    if let Some(text) = filter.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let pattern = like_pattern(text);
        qb.push(" AND (rv.content ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR u.nickname ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(hidden) = filter.hidden {
        qb.push(" AND rv.is_hidden = ").push_bind(hidden);
    }
}

/// Validate rating range and content length, returning trimmed content.
pub fn validate_review(rating: i16, content: &str) -> Result<String, ReviewError> {
    if !(MIN_RATING..=MAX_RATING).contains(&rating) {
        return Err(ReviewError::Invalid(format!(
            "rating must be between {MIN_RATING} and {MAX_RATING}"
        )));
    }
    let content = content.trim();
    if content.is_empty() {
        return Err(ReviewError::Invalid("content is required".into()));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(ReviewError::Invalid(format!(
            "content must be at most {MAX_CONTENT_CHARS} characters"
        )));
    }
    Ok(content.to_string())
}

/// Aggregate adjustment `(rating_sum delta, review_count delta)` for a visibility/rating change.
///
/// Only visible reviews count toward the aggregates.
pub fn aggregate_delta(
    before: Option<(bool, i16)>,
    after: Option<(bool, i16)>,
) -> (i64, i32) {
    let contribution = |state: Option<(bool, i16)>| match state {
        Some((false, rating)) => (rating as i64, 1),
        _ => (0, 0),
    };
    let (sum_before, count_before) = contribution(before);
    let (sum_after, count_after) = contribution(after);
    (sum_after - sum_before, count_after - count_before)
}

#[derive(sqlx::FromRow)]
struct LockedReview {
    restaurant_id: i32,
    user_id: i32,
    rating: i16,
    is_hidden: bool,
}

async fn lock_review(
    tx: &mut Transaction<'_, Postgres>,
    review_id: i32,
) -> Result<LockedReview, ReviewError> {
    sqlx::query_as::<_, LockedReview>(
        "SELECT restaurant_id, user_id, rating, is_hidden FROM reviews WHERE id = $1 FOR UPDATE",
    )
    .bind(review_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(ReviewError::NotFound)
}

async fn lock_restaurant(tx: &mut Transaction<'_, Postgres>, restaurant_id: i32) -> Result<bool, ReviewError> {
    let row: Option<(bool,)> =
        sqlx::query_as("SELECT is_hidden FROM restaurants WHERE id = $1 FOR UPDATE")
            .bind(restaurant_id)
            .fetch_optional(&mut **tx)
            .await?;
    row.map(|(hidden,)| hidden).ok_or(ReviewError::RestaurantNotFound)
}

async fn apply_delta(
    tx: &mut Transaction<'_, Postgres>,
    restaurant_id: i32,
    (sum_delta, count_delta): (i64, i32),
) -> Result<(), ReviewError> {
    if sum_delta == 0 && count_delta == 0 {
        return Ok(());
    }
    sqlx::query(
        "UPDATE restaurants SET rating_sum = rating_sum + $2, review_count = review_count + $3 \
         WHERE id = $1",
    )
    .bind(restaurant_id)
    .bind(sum_delta)
    .bind(count_delta)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Fetch one review as seen by `viewer_id`.
pub async fn get_review(
    pool: &PgPool,
    review_id: i32,
    viewer_id: Option<i32>,
) -> Result<Option<ReviewResponse>, ReviewError> {
    let mut qb = QueryBuilder::new("");
    push_select(&mut qb, viewer_id);
    qb.push(" WHERE rv.id = ").push_bind(review_id);
    let row = qb.build_query_as::<ReviewRow>().fetch_optional(pool).await?;
    Ok(row.map(ReviewResponse::from))
}

/// Create a visible review with its photos and count it into the restaurant aggregates.
pub async fn create_review(
    pool: &PgPool,
    user_id: i32,
    restaurant_id: i32,
    rating: i16,
    content: &str,
    photos: &[(String, String)],
) -> Result<ReviewResponse, ReviewError> {
    let content = validate_review(rating, content)?;

    let mut tx = pool.begin().await?;
    // Hidden restaurants do not accept new reviews.
    if lock_restaurant(&mut tx, restaurant_id).await? {
        return Err(ReviewError::RestaurantNotFound);
    }

    let (review_id,): (i32,) = sqlx::query_as(
        "INSERT INTO reviews (restaurant_id, user_id, rating, content) VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(restaurant_id)
    .bind(user_id)
    .bind(rating)
    .bind(&content)
    .fetch_one(&mut *tx)
    .await?;

    for (order, (url, file_path)) in photos.iter().enumerate() {
        sqlx::query(
            "INSERT INTO review_photos (review_id, url, file_path, sort_order) VALUES ($1, $2, $3, $4)",
        )
        .bind(review_id)
        .bind(url)
        .bind(file_path)
        .bind(order as i32)
        .execute(&mut *tx)
        .await?;
    }

    apply_delta(&mut tx, restaurant_id, aggregate_delta(None, Some((false, rating)))).await?;
    tx.commit().await?;

    tracing::debug!(review_id, restaurant_id, rating, "review created");
    get_review(pool, review_id, Some(user_id))
        .await?
        .ok_or(ReviewError::NotFound)
}

/// Edit rating and/or content (author or admin).
pub async fn update_review(
    pool: &PgPool,
    actor: Actor,
    review_id: i32,
    rating: Option<i16>,
    content: Option<&str>,
) -> Result<ReviewResponse, ReviewError> {
    let mut tx = pool.begin().await?;
    let current = lock_review(&mut tx, review_id).await?;
    if current.user_id != actor.user_id && !actor.is_admin {
        return Err(ReviewError::Forbidden);
    }
    lock_restaurant(&mut tx, current.restaurant_id).await?;

    let new_rating = rating.unwrap_or(current.rating);
    let new_content = match content {
        Some(text) => Some(validate_review(new_rating, text)?),
        None => {
            validate_review(new_rating, "-")?;
            None
        }
    };

    sqlx::query(
        "UPDATE reviews SET rating = $2, content = COALESCE($3, content), updated_at = now() WHERE id = $1",
    )
    .bind(review_id)
    .bind(new_rating)
    .bind(new_content)
    .execute(&mut *tx)
    .await?;

    let delta = aggregate_delta(
        Some((current.is_hidden, current.rating)),
        Some((current.is_hidden, new_rating)),
    );
    apply_delta(&mut tx, current.restaurant_id, delta).await?;
    tx.commit().await?;

    get_review(pool, review_id, Some(actor.user_id))
        .await?
        .ok_or(ReviewError::NotFound)
}

/// Delete a review (author or admin). Returns the photo file paths to remove from disk.
pub async fn delete_review(pool: &PgPool, actor: Actor, review_id: i32) -> Result<Vec<String>, ReviewError> {
    let mut tx = pool.begin().await?;
    let current = lock_review(&mut tx, review_id).await?;
    if current.user_id != actor.user_id && !actor.is_admin {
        return Err(ReviewError::Forbidden);
    }
    lock_restaurant(&mut tx, current.restaurant_id).await?;

    let files: Vec<(String,)> = sqlx::query_as("SELECT file_path FROM review_photos WHERE review_id = $1")
        .bind(review_id)
        .fetch_all(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM reviews WHERE id = $1")
        .bind(review_id)
        .execute(&mut *tx)
        .await?;

    let delta = aggregate_delta(Some((current.is_hidden, current.rating)), None);
    apply_delta(&mut tx, current.restaurant_id, delta).await?;
    tx.commit().await?;

    Ok(files.into_iter().map(|(p,)| p).collect())
}

/// Hide or show a review. Repeating the current state is a no-op.
///
/// Returns whether the visibility actually changed.
pub async fn set_review_hidden(
    pool: &PgPool,
    review_id: i32,
    hidden: bool,
    reason: Option<&str>,
) -> Result<bool, ReviewError> {
    let mut tx = pool.begin().await?;
    let current = lock_review(&mut tx, review_id).await?;
    if current.is_hidden == hidden {
        return Ok(false);
    }
    lock_restaurant(&mut tx, current.restaurant_id).await?;

    sqlx::query("UPDATE reviews SET is_hidden = $2, hidden_reason = $3, updated_at = now() WHERE id = $1")
        .bind(review_id)
        .bind(hidden)
        .bind(if hidden { reason } else { None })
        .execute(&mut *tx)
        .await?;

    let delta = aggregate_delta(
        Some((current.is_hidden, current.rating)),
        Some((hidden, current.rating)),
    );
    apply_delta(&mut tx, current.restaurant_id, delta).await?;
    tx.commit().await?;

    tracing::info!(review_id, hidden, "review visibility changed");
    Ok(true)
}

/// Page through reviews matching `filter`, as seen by `viewer_id`.
pub async fn list_reviews(
    pool: &PgPool,
    filter: &ReviewFilter,
    viewer_id: Option<i32>,
    sort: ReviewSort,
    page: Option<i64>,
    per_page: Option<i64>,
) -> Result<ReviewListResponse, ReviewError> {
    let (page, per_page, offset) = paginate(page, per_page, DEFAULT_PER_PAGE, MAX_PER_PAGE);

    let mut count_qb = QueryBuilder::new("SELECT COUNT(*)");
    count_qb.push(REVIEW_FROM);
    push_filter(&mut count_qb, filter);
    let (total,): (i64,) = count_qb.build_query_as().fetch_one(pool).await?;

    let mut list_qb = QueryBuilder::new("");
    push_select(&mut list_qb, viewer_id);
    push_filter(&mut list_qb, filter);
    list_qb.push(" ORDER BY ");
    list_qb.push(sort.order_by());
    list_qb.push(" LIMIT ").push_bind(per_page);
    list_qb.push(" OFFSET ").push_bind(offset);
    let rows = list_qb.build_query_as::<ReviewRow>().fetch_all(pool).await?;

    Ok(ReviewListResponse {
        reviews: rows.into_iter().map(ReviewResponse::from).collect(),
        total,
        page,
        per_page,
    })
}

/// Visible reviews of a restaurant.
pub async fn list_restaurant_reviews(
    pool: &PgPool,
    restaurant_id: i32,
    viewer_id: Option<i32>,
    sort: ReviewSort,
    page: Option<i64>,
    per_page: Option<i64>,
) -> Result<ReviewListResponse, ReviewError> {
    let filter = ReviewFilter {
        restaurant_id: Some(restaurant_id),
        hidden: Some(false),
        ..Default::default()
    };
    list_reviews(pool, &filter, viewer_id, sort, page, per_page).await
}

/// A user's own reviews, hidden ones included.
pub async fn list_user_reviews(
    pool: &PgPool,
    user_id: i32,
    page: Option<i64>,
    per_page: Option<i64>,
) -> Result<ReviewListResponse, ReviewError> {
    let filter = ReviewFilter {
        user_id: Some(user_id),
        ..Default::default()
    };
    list_reviews(pool, &filter, Some(user_id), ReviewSort::Latest, page, per_page).await
}

/// Like or unlike a visible review. Idempotent.
pub async fn set_review_like(
    pool: &PgPool,
    user_id: i32,
    review_id: i32,
    liked: bool,
) -> Result<LikeState, ReviewError> {
    let mut tx = pool.begin().await?;
    let row: Option<(i32, bool)> =
        sqlx::query_as("SELECT like_count, is_hidden FROM reviews WHERE id = $1 FOR UPDATE")
            .bind(review_id)
            .fetch_optional(&mut *tx)
            .await?;
    let (mut like_count, is_hidden) = row.ok_or(ReviewError::NotFound)?;
    if is_hidden {
        return Err(ReviewError::NotFound);
    }

    let changed = if liked {
        sqlx::query("INSERT INTO review_likes (user_id, review_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
    } else {
        sqlx::query("DELETE FROM review_likes WHERE user_id = $1 AND review_id = $2")
    }
    .bind(user_id)
    .bind(review_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if changed > 0 {
        let (count,): (i32,) = sqlx::query_as(
            "UPDATE reviews SET like_count = GREATEST(like_count + $2, 0) WHERE id = $1 RETURNING like_count",
        )
        .bind(review_id)
        .bind(if liked { 1 } else { -1 })
        .fetch_one(&mut *tx)
        .await?;
        like_count = count;
    }
    tx.commit().await?;
    Ok(LikeState { liked, like_count })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_review_bounds() {
        assert!(validate_review(0, "ok").is_err());
        assert!(validate_review(6, "ok").is_err());
        assert!(validate_review(3, "   ").is_err());
        assert_eq!(validate_review(5, "  맛있어요 ").unwrap(), "맛있어요");
        let long = "가".repeat(MAX_CONTENT_CHARS + 1);
        assert!(validate_review(4, &long).is_err());
    }

    #[test]
    fn test_delta_create_and_delete_visible() {
        assert_eq!(aggregate_delta(None, Some((false, 4))), (4, 1));
        assert_eq!(aggregate_delta(Some((false, 4)), None), (-4, -1));
    }

    #[test]
    fn test_delta_hidden_reviews_do_not_count() {
        assert_eq!(aggregate_delta(Some((true, 4)), None), (0, 0));
        assert_eq!(aggregate_delta(Some((true, 2)), Some((true, 5))), (0, 0));
    }

    #[test]
    fn test_delta_visibility_transitions() {
        // hide
        assert_eq!(aggregate_delta(Some((false, 3)), Some((true, 3))), (-3, -1));
        // show
        assert_eq!(aggregate_delta(Some((true, 3)), Some((false, 3))), (3, 1));
        // repeated hide
        assert_eq!(aggregate_delta(Some((true, 3)), Some((true, 3))), (0, 0));
    }

    #[test]
    fn test_delta_rating_edit_on_visible() {
        assert_eq!(aggregate_delta(Some((false, 2)), Some((false, 5))), (3, 0));
        assert_eq!(aggregate_delta(Some((false, 5)), Some((false, 1))), (-4, 0));
    }
}
