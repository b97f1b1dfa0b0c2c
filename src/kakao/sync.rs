//! Batch reconciliation of stored restaurants against Kakao Local.

use anyhow::Context;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{debug, info, instrument, warn};
use ts_rs::TS;

use super::matching::{self, MatchTarget};
use super::{KakaoClient, KakaoError, KakaoPlace};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SyncReport {
    pub processed: u32,
    pub matched: u32,
    pub unmatched: u32,
    pub failed: u32,
}

#[derive(Debug, sqlx::FromRow)]
struct PendingRestaurant {
    id: i32,
    name: String,
    address: String,
    kakao_place_id: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

/// `"{first two address tokens} {name}"`, the query shape Kakao ranks best.
pub fn search_query(name: &str, address: &str) -> String {
    let prefix: Vec<&str> = address.split_whitespace().take(2).collect();
    if prefix.is_empty() {
        name.trim().to_string()
    } else {
        format!("{} {}", prefix.join(" "), name.trim())
    }
}

/// Fill place id and coordinates for up to `limit` restaurants missing either.
///
/// Restaurants never attempted come first, then the least recently attempted,
/// so unmatched rows do not starve the rest of the table across runs.
/// Per-restaurant failures are counted and logged; only an unreachable
/// database or a missing API key abort the batch.
#[instrument(skip(pool, client))]
pub async fn sync_restaurants(pool: &PgPool, client: &KakaoClient, limit: i64) -> Result<SyncReport, KakaoError> {
    if !client.is_configured() {
        return Err(KakaoError::NotConfigured);
    }

    let pending = sqlx::query_as::<_, PendingRestaurant>(
        "SELECT id, name, address, kakao_place_id, latitude, longitude FROM restaurants \
         WHERE kakao_place_id IS NULL OR latitude IS NULL OR longitude IS NULL \
         ORDER BY kakao_synced_at NULLS FIRST, id LIMIT $1",
    )
    .bind(limit.clamp(1, 10_000))
    .fetch_all(pool)
    .await
    .context("failed to load restaurants pending Kakao sync")?;

    let mut report = SyncReport::default();
    for restaurant in &pending {
        report.processed += 1;
        match reconcile_one(pool, client, restaurant).await {
            Ok(true) => report.matched += 1,
            Ok(false) => report.unmatched += 1,
            Err(KakaoError::NotConfigured) => return Err(KakaoError::NotConfigured),
            Err(e) => {
                warn!(restaurant_id = restaurant.id, error = %e, "kakao sync failed for restaurant");
                report.failed += 1;
            }
        }
        mark_attempted(pool, restaurant.id).await?;
    }

    info!(
        processed = report.processed,
        matched = report.matched,
        unmatched = report.unmatched,
        failed = report.failed,
        "kakao sync finished"
    );
    Ok(report)
}

async fn mark_attempted(pool: &PgPool, restaurant_id: i32) -> Result<(), KakaoError> {
    sqlx::query("UPDATE restaurants SET kakao_synced_at = now() WHERE id = $1")
        .bind(restaurant_id)
        .execute(pool)
        .await
        .context("failed to record Kakao sync attempt")?;
    Ok(())
}

async fn reconcile_one(
    pool: &PgPool,
    client: &KakaoClient,
    restaurant: &PendingRestaurant,
) -> Result<bool, KakaoError> {
    let candidates = client
        .search_keyword(&search_query(&restaurant.name, &restaurant.address))
        .await?;
    if candidates.is_empty() {
        debug!(restaurant_id = restaurant.id, "no kakao candidates");
        return Ok(false);
    }

    // A restaurant that already has a place id only needs that place's details.
    let chosen: Option<&KakaoPlace> = match &restaurant.kakao_place_id {
        Some(place_id) => candidates.iter().find(|p| &p.id == place_id),
        None => {
            let ids: Vec<String> = candidates.iter().map(|p| p.id.clone()).collect();
            let taken: Vec<(String,)> = sqlx::query_as(
                "SELECT kakao_place_id FROM restaurants WHERE kakao_place_id = ANY($1) AND id <> $2",
            )
            .bind(&ids)
            .bind(restaurant.id)
            .fetch_all(pool)
            .await
            .context("failed to check claimed place ids")?;

            let target = MatchTarget {
                name: &restaurant.name,
                address: &restaurant.address,
                coordinates: restaurant.latitude.zip(restaurant.longitude),
            };
            matching::best_match(&target, &candidates, |id| taken.iter().any(|(t,)| t == id)).map(
                |(place, score)| {
                    debug!(
                        restaurant_id = restaurant.id,
                        place_id = %place.id,
                        total = score.total,
                        name = score.name,
                        address = score.address,
                        geo = score.geo,
                        "kakao candidate accepted"
                    );
                    place
                },
            )
        }
    };
    let Some(place) = chosen else {
        return Ok(false);
    };

    let (lat, lng) = place.coordinates().unzip();
    let non_empty = |s: &str| (!s.trim().is_empty()).then(|| s.trim().to_string());
    sqlx::query(
        "UPDATE restaurants SET \
           kakao_place_id = COALESCE(kakao_place_id, $2), \
           latitude = COALESCE(latitude, $3), \
           longitude = COALESCE(longitude, $4), \
           road_address = COALESCE(road_address, $5), \
           phone = COALESCE(phone, $6), \
           address = CASE WHEN address = '' THEN COALESCE($7, '') ELSE address END, \
           updated_at = now() \
         WHERE id = $1",
    )
    .bind(restaurant.id)
    .bind(&place.id)
    .bind(lat)
    .bind(lng)
    .bind(non_empty(&place.road_address_name))
    .bind(non_empty(&place.phone))
    .bind(non_empty(&place.address_name))
    .execute(pool)
    .await
    .context("failed to store Kakao match")?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_query_uses_region_prefix() {
        assert_eq!(search_query("을지면옥", "서울 중구 충무로14길 2-1"), "서울 중구 을지면옥");
        assert_eq!(search_query(" 우래옥 ", ""), "우래옥");
        assert_eq!(search_query("가게", "제주"), "제주 가게");
    }
}
