//! Shared fixtures for database integration tests.
#![allow(dead_code)]

use born2eat::data::models::{Tag, TagType, User, UserRole};
use born2eat::data::restaurants::{self, RestaurantInput};
use born2eat::data::tags;
use born2eat::data::users::{self, CreateUserOutcome};
use sqlx::PgPool;

/// Password hashes are never verified in these tests.
const FAKE_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHQ$aGFzaGhhc2hoYXNo";

pub async fn make_user(pool: &PgPool, nickname: &str) -> User {
    make_user_with_role(pool, nickname, UserRole::User).await
}

pub async fn make_admin(pool: &PgPool, nickname: &str) -> User {
    make_user_with_role(pool, nickname, UserRole::Admin).await
}

async fn make_user_with_role(pool: &PgPool, nickname: &str, role: UserRole) -> User {
    let email = format!("{nickname}@example.com");
    match users::create_user(pool, &email, FAKE_HASH, nickname, role)
        .await
        .expect("failed to insert user")
    {
        CreateUserOutcome::Created(user) => user,
        other => panic!("user fixture {nickname} collided: {other:?}"),
    }
}

/// Insert a region under `parent`, computing its depth.
pub async fn make_region(pool: &PgPool, name: &str, parent: Option<i32>) -> i32 {
    let (id,): (i32,) = sqlx::query_as(
        "INSERT INTO regions (name, parent_id, depth) \
         VALUES ($1, $2, COALESCE((SELECT depth + 1 FROM regions WHERE id = $2), 1)) RETURNING id",
    )
    .bind(name)
    .bind(parent)
    .fetch_one(pool)
    .await
    .expect("failed to insert region");
    id
}

pub async fn make_restaurant(pool: &PgPool, name: &str, address: &str, region_id: Option<i32>) -> i32 {
    let input = RestaurantInput {
        name: name.to_owned(),
        address: address.to_owned(),
        region_id,
        ..Default::default()
    };
    restaurants::create_restaurant(pool, &input)
        .await
        .expect("failed to insert restaurant")
        .id
}

pub async fn make_tag(pool: &PgPool, tag_type: TagType, name: &str, parent: Option<i32>) -> Tag {
    tags::create_tag(pool, tag_type, name, parent, 0)
        .await
        .expect("failed to insert tag")
}

pub async fn tag_restaurant(pool: &PgPool, restaurant_id: i32, tag_ids: &[i32]) {
    restaurants::set_restaurant_tags(pool, restaurant_id, tag_ids)
        .await
        .expect("failed to tag restaurant");
}

/// `(rating_sum, review_count)` as stored on the restaurant row.
pub async fn aggregates(pool: &PgPool, restaurant_id: i32) -> (i64, i32) {
    sqlx::query_as("SELECT rating_sum, review_count FROM restaurants WHERE id = $1")
        .bind(restaurant_id)
        .fetch_one(pool)
        .await
        .expect("failed to read aggregates")
}
