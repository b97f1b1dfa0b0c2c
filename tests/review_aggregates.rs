//! Restaurant rating aggregates must always equal the sum and count of the
//! restaurant's visible reviews, whatever sequence of mutations ran.

mod helpers;

use born2eat::data::aggregates::recompute_all;
use born2eat::data::ranking::global_mean;
use born2eat::data::reviews::{
    Actor, ReviewError, create_review, delete_review, set_review_hidden, set_review_like, update_review,
};
use helpers::{aggregates, make_admin, make_restaurant, make_user};
use sqlx::PgPool;

fn author(user_id: i32) -> Actor {
    Actor {
        user_id,
        is_admin: false,
    }
}

#[sqlx::test]
async fn test_create_and_update_adjust_aggregates(pool: PgPool) {
    let restaurant = make_restaurant(&pool, "을지면옥", "서울특별시 중구 충무로14길 2-1", None).await;
    let alice = make_user(&pool, "alice").await;
    let bob = make_user(&pool, "bob").await;

    let first = create_review(&pool, alice.id, restaurant, 4, "평양냉면 맛집", &[])
        .await
        .unwrap();
    create_review(&pool, bob.id, restaurant, 2, "너무 싱거워요", &[])
        .await
        .unwrap();
    assert_eq!(aggregates(&pool, restaurant).await, (6, 2));

    let updated = update_review(&pool, author(alice.id), first.id, Some(5), None)
        .await
        .unwrap();
    assert_eq!(updated.rating, 5);
    assert_eq!(updated.content, "평양냉면 맛집");
    assert_eq!(aggregates(&pool, restaurant).await, (7, 2));
}

#[sqlx::test]
async fn test_hide_and_show_are_idempotent(pool: PgPool) {
    let restaurant = make_restaurant(&pool, "진주집", "서울특별시 영등포구 국제금융로6길 33", None).await;
    let user = make_user(&pool, "carol").await;
    let review = create_review(&pool, user.id, restaurant, 3, "콩국수", &[])
        .await
        .unwrap();

    assert!(set_review_hidden(&pool, review.id, true, Some("광고")).await.unwrap());
    assert_eq!(aggregates(&pool, restaurant).await, (0, 0));
    assert!(!set_review_hidden(&pool, review.id, true, Some("광고")).await.unwrap());
    assert_eq!(aggregates(&pool, restaurant).await, (0, 0));

    assert!(set_review_hidden(&pool, review.id, false, None).await.unwrap());
    assert!(!set_review_hidden(&pool, review.id, false, None).await.unwrap());
    assert_eq!(aggregates(&pool, restaurant).await, (3, 1));
}

#[sqlx::test]
async fn test_hidden_review_changes_do_not_touch_aggregates(pool: PgPool) {
    let restaurant = make_restaurant(&pool, "하동관", "서울특별시 중구 명동9길 12", None).await;
    let user = make_user(&pool, "dave").await;
    let visible = create_review(&pool, user.id, restaurant, 5, "곰탕", &[]).await.unwrap();
    let hidden = create_review(&pool, user.id, restaurant, 1, "별로", &[]).await.unwrap();
    set_review_hidden(&pool, hidden.id, true, None).await.unwrap();
    assert_eq!(aggregates(&pool, restaurant).await, (5, 1));

    update_review(&pool, author(user.id), hidden.id, Some(4), None)
        .await
        .unwrap();
    assert_eq!(aggregates(&pool, restaurant).await, (5, 1));

    delete_review(&pool, author(user.id), hidden.id).await.unwrap();
    assert_eq!(aggregates(&pool, restaurant).await, (5, 1));

    delete_review(&pool, author(user.id), visible.id).await.unwrap();
    assert_eq!(aggregates(&pool, restaurant).await, (0, 0));
}

#[sqlx::test]
async fn test_author_or_admin_may_edit_and_delete(pool: PgPool) {
    let restaurant = make_restaurant(&pool, "우래옥", "서울특별시 중구 창경궁로 62-29", None).await;
    let writer = make_user(&pool, "erin").await;
    let other = make_user(&pool, "frank").await;
    let admin = make_admin(&pool, "root").await;
    let as_admin = Actor {
        user_id: admin.id,
        is_admin: true,
    };
    let review = create_review(&pool, writer.id, restaurant, 4, "불고기", &[]).await.unwrap();

    let err = update_review(&pool, author(other.id), review.id, Some(1), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::Forbidden));
    assert!(matches!(
        delete_review(&pool, author(other.id), review.id).await,
        Err(ReviewError::Forbidden)
    ));
    assert_eq!(aggregates(&pool, restaurant).await, (4, 1));

    let edited = update_review(&pool, as_admin, review.id, Some(2), Some("관리자 수정"))
        .await
        .unwrap();
    assert_eq!(edited.rating, 2);
    assert_eq!(edited.author.id, writer.id);
    assert_eq!(aggregates(&pool, restaurant).await, (2, 1));

    delete_review(&pool, as_admin, review.id).await.unwrap();
    assert_eq!(aggregates(&pool, restaurant).await, (0, 0));
}

#[sqlx::test]
async fn test_invalid_reviews_are_rejected(pool: PgPool) {
    let restaurant = make_restaurant(&pool, "명동교자", "서울특별시 중구 명동10길 29", None).await;
    let user = make_user(&pool, "gina").await;

    assert!(matches!(
        create_review(&pool, user.id, restaurant, 6, "칼국수", &[]).await,
        Err(ReviewError::Invalid(_))
    ));
    assert!(matches!(
        create_review(&pool, user.id, restaurant, 3, "   ", &[]).await,
        Err(ReviewError::Invalid(_))
    ));
    assert!(matches!(
        create_review(&pool, user.id, restaurant + 1000, 3, "칼국수", &[]).await,
        Err(ReviewError::RestaurantNotFound)
    ));
    assert_eq!(aggregates(&pool, restaurant).await, (0, 0));
}

#[sqlx::test]
async fn test_review_likes_are_idempotent(pool: PgPool) {
    let restaurant = make_restaurant(&pool, "부산집", "부산광역시 중구 광복로 1", None).await;
    let writer = make_user(&pool, "hana").await;
    let fan = make_user(&pool, "ivan").await;
    let review = create_review(&pool, writer.id, restaurant, 5, "돼지국밥", &[]).await.unwrap();

    let state = set_review_like(&pool, fan.id, review.id, true).await.unwrap();
    assert!(state.liked);
    assert_eq!(state.like_count, 1);
    let state = set_review_like(&pool, fan.id, review.id, true).await.unwrap();
    assert_eq!(state.like_count, 1);

    let state = set_review_like(&pool, fan.id, review.id, false).await.unwrap();
    assert!(!state.liked);
    assert_eq!(state.like_count, 0);
    let state = set_review_like(&pool, fan.id, review.id, false).await.unwrap();
    assert_eq!(state.like_count, 0);
}

#[sqlx::test]
async fn test_recompute_repairs_drift(pool: PgPool) {
    let restaurant = make_restaurant(&pool, "필동면옥", "서울특별시 중구 서애로 26", None).await;
    let user = make_user(&pool, "jun").await;
    create_review(&pool, user.id, restaurant, 4, "냉면", &[]).await.unwrap();

    let report = recompute_all(&pool).await.unwrap();
    assert_eq!(report.restaurants_fixed, 0);

    sqlx::query("UPDATE restaurants SET rating_sum = 40, review_count = 9 WHERE id = $1")
        .bind(restaurant)
        .execute(&pool)
        .await
        .unwrap();
    let report = recompute_all(&pool).await.unwrap();
    assert_eq!(report.restaurants_fixed, 1);
    assert_eq!(aggregates(&pool, restaurant).await, (4, 1));
}

#[sqlx::test]
async fn test_global_mean_counts_hidden_restaurants(pool: PgPool) {
    let shown = make_restaurant(&pool, "우래옥", "서울특별시 중구 창경궁로 62-29", None).await;
    let hidden = make_restaurant(&pool, "폐업한 집", "서울특별시 중구 1", None).await;
    let user = make_user(&pool, "dave").await;
    assert!((global_mean(&pool).await.unwrap() - 3.0).abs() < 1e-9);

    create_review(&pool, user.id, shown, 5, "육수가 깊어요", &[]).await.unwrap();
    create_review(&pool, user.id, hidden, 2, "불친절", &[]).await.unwrap();
    sqlx::query("UPDATE restaurants SET is_hidden = TRUE WHERE id = $1")
        .bind(hidden)
        .execute(&pool)
        .await
        .unwrap();

    assert!((global_mean(&pool).await.unwrap() - 3.5).abs() < 1e-9);
}
