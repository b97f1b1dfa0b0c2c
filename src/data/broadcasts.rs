//! Broadcast programs, their episodes, and the restaurants each episode featured.

use std::collections::HashSet;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use ts_rs::TS;

use super::models::{Broadcast, BroadcastEpisode};
use super::regions;
use crate::crawler::{ScrapedEpisode, ScrapedRestaurant};
use crate::utils::paginate;

const BROADCAST_COLUMNS: &str = "id, code, name, channel, episode_url_template, list_url";
const EPISODE_COLUMNS: &str =
    "id, broadcast_id, episode_no, title, air_date, source_url, parser_ver, created_at";

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct EpisodeRestaurant {
    pub restaurant_id: Option<i32>,
    pub name: String,
    pub address: String,
    pub menu: Option<String>,
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct EpisodeView {
    #[serde(flatten)]
    pub episode: BroadcastEpisode,
    pub restaurants: Vec<EpisodeRestaurant>,
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct EpisodeListResponse {
    pub broadcast: Broadcast,
    pub episodes: Vec<EpisodeView>,
    #[ts(type = "number")]
    pub total: i64,
    #[ts(type = "number")]
    pub page: i64,
    #[ts(type = "number")]
    pub per_page: i64,
}

#[derive(sqlx::FromRow)]
struct EpisodeRow {
    #[sqlx(flatten)]
    episode: BroadcastEpisode,
    restaurants: Json<Vec<EpisodeRestaurant>>,
}

/// What [`persist_episode`] wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    Stored {
        episode_id: i32,
        restaurants_linked: usize,
        restaurants_created: usize,
    },
    /// Another writer stored the same `(broadcast, episode_no)` first.
    AlreadyExists,
}

pub async fn list_broadcasts(pool: &PgPool) -> Result<Vec<Broadcast>> {
    sqlx::query_as::<_, Broadcast>(&format!("SELECT {BROADCAST_COLUMNS} FROM broadcasts ORDER BY id"))
        .fetch_all(pool)
        .await
        .context("failed to list broadcasts")
}

pub async fn get_by_code(pool: &PgPool, code: &str) -> Result<Option<Broadcast>> {
    sqlx::query_as::<_, Broadcast>(&format!(
        "SELECT {BROADCAST_COLUMNS} FROM broadcasts WHERE code = $1"
    ))
    .bind(code)
    .fetch_optional(pool)
    .await
    .context("failed to fetch broadcast")
}

pub async fn episode_exists(pool: &PgPool, broadcast_id: i32, episode_no: i32) -> Result<bool> {
    let (exists,): (bool,) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM broadcast_episodes WHERE broadcast_id = $1 AND episode_no = $2)",
    )
    .bind(broadcast_id)
    .bind(episode_no)
    .fetch_one(pool)
    .await
    .context("failed to check episode")?;
    Ok(exists)
}

/// Episodes of a broadcast, newest episode number first, with their restaurant mentions.
pub async fn list_episodes(
    pool: &PgPool,
    broadcast: Broadcast,
    page: Option<i64>,
    per_page: Option<i64>,
) -> Result<EpisodeListResponse> {
    let (page, per_page, offset) = paginate(page, per_page, 20, 100);

    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM broadcast_episodes WHERE broadcast_id = $1")
        .bind(broadcast.id)
        .fetch_one(pool)
        .await
        .context("failed to count episodes")?;

    let rows = sqlx::query_as::<_, EpisodeRow>(&format!(
        "SELECT {EPISODE_COLUMNS}, \
         COALESCE((SELECT json_agg(json_build_object('restaurantId', br.restaurant_id, 'name', br.name, \
             'address', br.address, 'menu', br.menu) ORDER BY br.id) \
             FROM broadcast_restaurants br WHERE br.episode_id = e.id), '[]'::json) AS restaurants \
         FROM broadcast_episodes e WHERE e.broadcast_id = $1 \
         ORDER BY e.episode_no DESC LIMIT $2 OFFSET $3"
    ))
    .bind(broadcast.id)
    .bind(per_page)
    .bind(offset)
    .fetch_all(pool)
    .await
    .context("failed to list episodes")?;

    Ok(EpisodeListResponse {
        broadcast,
        episodes: rows
            .into_iter()
            .map(|row| EpisodeView {
                episode: row.episode,
                restaurants: row.restaurants.0,
            })
            .collect(),
        total,
        page,
        per_page,
    })
}

/// Store an episode, its restaurants and their associations atomically.
///
/// Restaurants are reused when one already carries the same Kakao place id,
/// or failing that the exact same name and address; otherwise a new
/// restaurant row is created.
pub async fn persist_episode(
    pool: &PgPool,
    broadcast_id: i32,
    scraped: &ScrapedEpisode,
) -> Result<PersistOutcome> {
    // Region lookups are read-only; resolve them before taking the write transaction.
    let mut region_ids = Vec::with_capacity(scraped.restaurants.len());
    for r in &scraped.restaurants {
        let region = if r.address.is_empty() {
            None
        } else {
            regions::resolve_from_address(pool, &r.address).await?
        };
        region_ids.push(region);
    }

    let mut tx = pool.begin().await?;
    let inserted: Option<(i32,)> = sqlx::query_as(
        "INSERT INTO broadcast_episodes (broadcast_id, episode_no, title, air_date, source_url, parser_ver) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (broadcast_id, episode_no) DO NOTHING RETURNING id",
    )
    .bind(broadcast_id)
    .bind(scraped.episode_no)
    .bind(&scraped.title)
    .bind(scraped.air_date)
    .bind(&scraped.source_url)
    .bind(scraped.parser_ver)
    .fetch_optional(&mut *tx)
    .await
    .context("failed to insert episode")?;
    let Some((episode_id,)) = inserted else {
        return Ok(PersistOutcome::AlreadyExists);
    };

    let mut seen = HashSet::new();
    let mut created = 0;
    for (mention, region_id) in scraped.restaurants.iter().zip(region_ids) {
        let (restaurant_id, was_created) = find_or_create_restaurant(&mut tx, mention, region_id).await?;
        if was_created {
            created += 1;
        }
        if !seen.insert(restaurant_id) {
            continue;
        }
        sqlx::query(
            "INSERT INTO broadcast_restaurants (episode_id, restaurant_id, name, address, menu, kakao_place_id) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(episode_id)
        .bind(restaurant_id)
        .bind(&mention.name)
        .bind(&mention.address)
        .bind(&mention.menu)
        .bind(&mention.kakao_place_id)
        .execute(&mut *tx)
        .await
        .context("failed to link restaurant to episode")?;
    }
    tx.commit().await?;

    Ok(PersistOutcome::Stored {
        episode_id,
        restaurants_linked: seen.len(),
        restaurants_created: created,
    })
}

async fn find_or_create_restaurant(
    tx: &mut Transaction<'_, Postgres>,
    mention: &ScrapedRestaurant,
    region_id: Option<i32>,
) -> Result<(i32, bool)> {
    if let Some(place_id) = &mention.kakao_place_id {
        let found: Option<(i32,)> = sqlx::query_as("SELECT id FROM restaurants WHERE kakao_place_id = $1")
            .bind(place_id)
            .fetch_optional(&mut **tx)
            .await
            .context("failed to look up restaurant by place id")?;
        if let Some((id,)) = found {
            return Ok((id, false));
        }
    }

    let found: Option<(i32,)> = sqlx::query_as(
        "SELECT id FROM restaurants WHERE name = $1 AND address = $2 ORDER BY id LIMIT 1 FOR UPDATE",
    )
    .bind(&mention.name)
    .bind(&mention.address)
    .fetch_optional(&mut **tx)
    .await
    .context("failed to look up restaurant by name and address")?;
    if let Some((id,)) = found {
        if let Some(place_id) = &mention.kakao_place_id {
            sqlx::query(
                "UPDATE restaurants SET kakao_place_id = $2, updated_at = now() \
                 WHERE id = $1 AND kakao_place_id IS NULL",
            )
            .bind(id)
            .bind(place_id)
            .execute(&mut **tx)
            .await
            .context("failed to attach place id")?;
        }
        return Ok((id, false));
    }

    let (id,): (i32,) = sqlx::query_as(
        "INSERT INTO restaurants (name, address, region_id, main_menu, kakao_place_id) \
         VALUES ($1, $2, $3, $4, $5) RETURNING id",
    )
    .bind(&mention.name)
    .bind(&mention.address)
    .bind(region_id)
    .bind(&mention.menu)
    .bind(&mention.kakao_place_id)
    .fetch_one(&mut **tx)
    .await
    .context("failed to insert crawled restaurant")?;
    tracing::debug!(restaurant_id = id, name = %mention.name, "created restaurant from broadcast");
    Ok((id, true))
}
