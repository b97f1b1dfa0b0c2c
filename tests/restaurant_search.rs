mod helpers;

use born2eat::data::models::TagType;
use born2eat::data::restaurant_query::{
    ListOptions, MAX_PER_PAGE, RestaurantFilter, RestaurantListResponse, RestaurantSort,
    list_restaurants,
};
use born2eat::data::restaurants::{self, RestaurantInput, like_restaurant};
use born2eat::data::reviews::create_review;
use helpers::{make_region, make_restaurant, make_tag, make_user, tag_restaurant};
use sqlx::PgPool;

async fn search(pool: &PgPool, filter: RestaurantFilter) -> RestaurantListResponse {
    list_restaurants(pool, &filter, &ListOptions::default())
        .await
        .expect("search failed")
}

fn names(response: &RestaurantListResponse) -> Vec<&str> {
    let mut names: Vec<&str> = response.restaurants.iter().map(|r| r.name.as_str()).collect();
    names.sort_unstable();
    names
}

#[sqlx::test]
async fn test_tag_filter_requires_every_tag(pool: PgPool) {
    let parking = make_tag(&pool, TagType::Tag, "주차", None).await;
    let solo = make_tag(&pool, TagType::Tag, "혼밥", None).await;
    let both = make_restaurant(&pool, "둘다", "서울 종로구 1", None).await;
    let only_parking = make_restaurant(&pool, "주차만", "서울 종로구 2", None).await;
    make_restaurant(&pool, "없음", "서울 종로구 3", None).await;
    tag_restaurant(&pool, both, &[parking.id, solo.id]).await;
    tag_restaurant(&pool, only_parking, &[parking.id]).await;

    let response = search(
        &pool,
        RestaurantFilter {
            tag_ids: vec![parking.id, solo.id],
            ..Default::default()
        },
    )
    .await;
    assert_eq!(names(&response), vec!["둘다"]);
    assert_eq!(response.total, 1);

    // Repeated ids must not inflate the required count.
    let response = search(
        &pool,
        RestaurantFilter {
            tag_ids: vec![parking.id, parking.id],
            ..Default::default()
        },
    )
    .await;
    assert_eq!(names(&response), vec!["둘다", "주차만"]);
}

#[sqlx::test]
async fn test_region_filter_includes_descendants(pool: PgPool) {
    let seoul = make_region(&pool, "서울특별시", None).await;
    let mapo = make_region(&pool, "마포구", Some(seoul)).await;
    let hapjeong = make_region(&pool, "합정동", Some(mapo)).await;
    let busan = make_region(&pool, "부산광역시", None).await;

    make_restaurant(&pool, "합정식당", "서울 마포구 합정동 1", Some(hapjeong)).await;
    make_restaurant(&pool, "마포식당", "서울 마포구 2", Some(mapo)).await;
    make_restaurant(&pool, "부산식당", "부산 중구 3", Some(busan)).await;

    let response = search(
        &pool,
        RestaurantFilter {
            region_id: Some(seoul),
            ..Default::default()
        },
    )
    .await;
    assert_eq!(names(&response), vec!["마포식당", "합정식당"]);

    let response = search(
        &pool,
        RestaurantFilter {
            region_id: Some(hapjeong),
            ..Default::default()
        },
    )
    .await;
    assert_eq!(names(&response), vec!["합정식당"]);
}

#[sqlx::test]
async fn test_food_category_matches_subtree(pool: PgPool) {
    let korean = make_tag(&pool, TagType::Food, "한식", None).await;
    let noodles = make_tag(&pool, TagType::Food, "면류", Some(korean.id)).await;
    let japanese = make_tag(&pool, TagType::Food, "일식", None).await;

    let naengmyeon = make_restaurant(&pool, "냉면집", "서울 중구 1", None).await;
    let sushi = make_restaurant(&pool, "초밥집", "서울 중구 2", None).await;
    tag_restaurant(&pool, naengmyeon, &[noodles.id]).await;
    tag_restaurant(&pool, sushi, &[japanese.id]).await;

    let path = restaurants::food_tag_path(&pool, korean.id)
        .await
        .unwrap()
        .expect("food tag exists");
    assert_eq!(path, korean.path);

    let response = search(
        &pool,
        RestaurantFilter {
            food_path: Some(path),
            ..Default::default()
        },
    )
    .await;
    assert_eq!(names(&response), vec!["냉면집"]);
}

#[sqlx::test]
async fn test_hidden_restaurants_only_for_admin_listing(pool: PgPool) {
    make_restaurant(&pool, "보이는집", "서울 강남구 1", None).await;
    let input = RestaurantInput {
        name: "숨긴집".into(),
        address: "서울 강남구 2".into(),
        is_hidden: true,
        ..Default::default()
    };
    restaurants::create_restaurant(&pool, &input).await.unwrap();

    let response = search(&pool, RestaurantFilter::default()).await;
    assert_eq!(names(&response), vec!["보이는집"]);

    let response = search(
        &pool,
        RestaurantFilter {
            include_hidden: true,
            ..Default::default()
        },
    )
    .await;
    assert_eq!(response.total, 2);
    assert!(response.restaurants.iter().any(|r| r.is_hidden));
}

#[sqlx::test]
async fn test_text_query_matches_name_address_and_menu(pool: PgPool) {
    make_restaurant(&pool, "을지로 골뱅이", "서울 중구 을지로 1", None).await;
    make_restaurant(&pool, "시장 분식", "서울 종로구 광장시장", None).await;
    let input = RestaurantInput {
        name: "정육식당".into(),
        address: "서울 용산구 3".into(),
        main_menu: Some("골뱅이무침, 삼겹살".into()),
        ..Default::default()
    };
    restaurants::create_restaurant(&pool, &input).await.unwrap();

    let by_menu = |q: &str| RestaurantFilter {
        query: Some(q.to_owned()),
        ..Default::default()
    };
    assert_eq!(
        names(&search(&pool, by_menu("골뱅이")).await),
        vec!["을지로 골뱅이", "정육식당"]
    );
    assert_eq!(names(&search(&pool, by_menu("광장")).await), vec!["시장 분식"]);
    assert_eq!(search(&pool, by_menu("100%")).await.total, 0);
}

#[sqlx::test]
async fn test_liked_by_and_viewer_flags(pool: PgPool) {
    let user = make_user(&pool, "likes").await;
    let liked = make_restaurant(&pool, "찜한집", "서울 성동구 1", None).await;
    make_restaurant(&pool, "그냥집", "서울 성동구 2", None).await;
    like_restaurant(&pool, user.id, liked).await.unwrap().expect("visible");

    let filter = RestaurantFilter {
        liked_by: Some(user.id),
        ..Default::default()
    };
    let opts = ListOptions {
        viewer_id: Some(user.id),
        ..Default::default()
    };
    let response = list_restaurants(&pool, &filter, &opts).await.unwrap();
    assert_eq!(names(&response), vec!["찜한집"]);
    assert!(response.restaurants[0].liked_by_me);
    assert_eq!(response.restaurants[0].like_count, 1);
}

#[sqlx::test]
async fn test_score_sort_prefers_better_rated(pool: PgPool) {
    let good = make_restaurant(&pool, "맛집", "서울 마포구 1", None).await;
    let bad = make_restaurant(&pool, "실망", "서울 마포구 2", None).await;
    for nickname in ["a1", "a2", "a3"] {
        let user = make_user(&pool, nickname).await;
        create_review(&pool, user.id, good, 5, "최고", &[]).await.unwrap();
        create_review(&pool, user.id, bad, 1, "별로", &[]).await.unwrap();
    }

    let opts = ListOptions {
        sort: RestaurantSort::Score,
        ..Default::default()
    };
    let response = list_restaurants(&pool, &RestaurantFilter::default(), &opts)
        .await
        .unwrap();
    assert_eq!(response.restaurants[0].id, good);
    assert_eq!(response.restaurants[1].id, bad);
    assert!(response.restaurants[0].score > response.restaurants[1].score);
    assert_eq!(response.restaurants[0].average_rating, Some(5.0));

    let opts = ListOptions {
        sort: RestaurantSort::Name,
        per_page: 1,
        page: 2,
        ..Default::default()
    };
    let response = list_restaurants(&pool, &RestaurantFilter::default(), &opts)
        .await
        .unwrap();
    assert_eq!(response.total, 2);
    assert_eq!(response.restaurants.len(), 1);
}

#[sqlx::test]
async fn test_out_of_range_page_is_empty(pool: PgPool) {
    make_restaurant(&pool, "끝집", "서울 중구 9", None).await;
    let opts = ListOptions {
        page: i64::MAX,
        per_page: MAX_PER_PAGE,
        ..Default::default()
    };
    let response = list_restaurants(&pool, &RestaurantFilter::default(), &opts)
        .await
        .unwrap();
    assert_eq!(response.total, 1);
    assert!(response.restaurants.is_empty());
    assert_eq!(response.page, i64::MAX / MAX_PER_PAGE);
}
