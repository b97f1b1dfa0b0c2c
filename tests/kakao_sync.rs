mod helpers;

use std::collections::HashMap;

use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use born2eat::data::restaurants::{self, RestaurantInput};
use born2eat::kakao::{KakaoClient, KakaoError, sync_restaurants};
use helpers::make_restaurant;
use serde_json::{Value, json};
use sqlx::PgPool;

fn place(id: &str, name: &str, address: &str, phone: &str) -> Value {
    json!({
        "id": id,
        "place_name": name,
        "phone": phone,
        "address_name": address,
        "road_address_name": format!("{address}길"),
        "x": "126.98",
        "y": "37.56",
    })
}

/// Keyword search stand-in: places named after the query, failures for `고장`.
async fn keyword_search(Query(params): Query<HashMap<String, String>>) -> Response {
    let query = params.get("query").cloned().unwrap_or_default();
    let documents = if query.contains("고장") {
        return (StatusCode::INTERNAL_SERVER_ERROR, "upstream down").into_response();
    } else if query.contains("을지면옥") {
        vec![place("1001", "을지면옥", "서울 중구 충무로 1", "02-111-1111")]
    } else if query.contains("우래옥") {
        vec![place("2002", "우래옥", "서울 중구 창경궁로 2", "02-222-2222")]
    } else if query.contains("진주집") {
        // Already claimed by another restaurant in the claimed-id test.
        vec![place("3003", "진주집", "서울 영등포구 국제금융로 3", "")]
    } else {
        Vec::new()
    };
    Json(json!({ "documents": documents })).into_response()
}

async fn fake_kakao() -> KakaoClient {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().route("/v2/local/search/keyword.json", get(keyword_search));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    KakaoClient::new(
        reqwest::Client::new(),
        &format!("http://{addr}"),
        Some("test-key".into()),
        1000,
    )
}

async fn place_id(pool: &PgPool, id: i32) -> Option<String> {
    restaurants::get_restaurant(pool, id)
        .await
        .unwrap()
        .unwrap()
        .kakao_place_id
}

#[sqlx::test]
async fn test_unmatched_rows_do_not_block_later_ones(pool: PgPool) {
    let client = fake_kakao().await;
    for name in ["없는집1", "없는집2", "없는집3"] {
        make_restaurant(&pool, name, "서울 중구 어딘가", None).await;
    }
    let findable = make_restaurant(&pool, "을지면옥", "서울 중구 충무로 1", None).await;

    let first = sync_restaurants(&pool, &client, 3).await.unwrap();
    assert_eq!(first.processed, 3);
    assert_eq!(first.unmatched, 3);
    assert_eq!(place_id(&pool, findable).await, None);

    let second = sync_restaurants(&pool, &client, 3).await.unwrap();
    assert_eq!(second.matched, 1);
    assert_eq!(place_id(&pool, findable).await.as_deref(), Some("1001"));
}

#[sqlx::test]
async fn test_only_empty_fields_are_filled(pool: PgPool) {
    let client = fake_kakao().await;
    let input = RestaurantInput {
        name: "우래옥".into(),
        address: "서울 중구 창경궁로 2".into(),
        phone: Some("02-000-0000".into()),
        ..Default::default()
    };
    let id = restaurants::create_restaurant(&pool, &input).await.unwrap().id;

    let report = sync_restaurants(&pool, &client, 10).await.unwrap();
    assert_eq!(report.matched, 1);

    let stored = restaurants::get_restaurant(&pool, id).await.unwrap().unwrap();
    assert_eq!(stored.kakao_place_id.as_deref(), Some("2002"));
    assert_eq!(stored.phone.as_deref(), Some("02-000-0000"));
    assert_eq!(stored.road_address.as_deref(), Some("서울 중구 창경궁로 2길"));
    assert_eq!(stored.latitude, Some(37.56));
    assert_eq!(stored.longitude, Some(126.98));
}

#[sqlx::test]
async fn test_claimed_place_ids_are_skipped(pool: PgPool) {
    let client = fake_kakao().await;
    let owner = RestaurantInput {
        name: "진주집 본점".into(),
        address: "서울 영등포구 국제금융로 3".into(),
        kakao_place_id: Some("3003".into()),
        latitude: Some(37.52),
        longitude: Some(126.92),
        ..Default::default()
    };
    restaurants::create_restaurant(&pool, &owner).await.unwrap();
    let copy = make_restaurant(&pool, "진주집", "서울 영등포구 국제금융로 3", None).await;

    let report = sync_restaurants(&pool, &client, 10).await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.unmatched, 1);
    assert_eq!(place_id(&pool, copy).await, None);
}

#[sqlx::test]
async fn test_failures_are_counted_and_batch_continues(pool: PgPool) {
    let client = fake_kakao().await;
    make_restaurant(&pool, "고장난집", "서울 중구 1", None).await;
    let findable = make_restaurant(&pool, "을지면옥", "서울 중구 충무로 1", None).await;

    let report = sync_restaurants(&pool, &client, 10).await.unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.matched, 1);
    assert_eq!(place_id(&pool, findable).await.as_deref(), Some("1001"));
}

#[sqlx::test]
async fn test_unconfigured_client_is_rejected(pool: PgPool) {
    let client = KakaoClient::new(reqwest::Client::new(), "http://127.0.0.1:9", None, 5);
    assert!(matches!(
        sync_restaurants(&pool, &client, 10).await,
        Err(KakaoError::NotConfigured)
    ));
}
