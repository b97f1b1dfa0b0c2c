//! Admin dashboard counters.

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::PgPool;
use ts_rs::TS;

#[derive(Debug, Clone, Serialize, sqlx::FromRow, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DashboardStats {
    #[ts(type = "number")]
    pub users: i64,
    #[ts(type = "number")]
    pub users_today: i64,
    #[ts(type = "number")]
    pub restaurants: i64,
    #[ts(type = "number")]
    pub hidden_restaurants: i64,
    #[ts(type = "number")]
    pub restaurants_without_place: i64,
    #[ts(type = "number")]
    pub reviews: i64,
    #[ts(type = "number")]
    pub hidden_reviews: i64,
    #[ts(type = "number")]
    pub reviews_today: i64,
    #[ts(type = "number")]
    pub pending_inquiries: i64,
    #[ts(type = "number")]
    pub episodes: i64,
    #[ts(type = "number")]
    pub active_sessions: i64,
}

pub async fn load_stats(pool: &PgPool) -> Result<DashboardStats> {
    sqlx::query_as::<_, DashboardStats>(
        "SELECT \
           (SELECT COUNT(*) FROM users) AS users, \
           (SELECT COUNT(*) FROM users WHERE created_at >= date_trunc('day', now())) AS users_today, \
           (SELECT COUNT(*) FROM restaurants) AS restaurants, \
           (SELECT COUNT(*) FROM restaurants WHERE is_hidden) AS hidden_restaurants, \
           (SELECT COUNT(*) FROM restaurants WHERE kakao_place_id IS NULL) AS restaurants_without_place, \
           (SELECT COUNT(*) FROM reviews) AS reviews, \
           (SELECT COUNT(*) FROM reviews WHERE is_hidden) AS hidden_reviews, \
           (SELECT COUNT(*) FROM reviews WHERE created_at >= date_trunc('day', now())) AS reviews_today, \
           (SELECT COUNT(*) FROM inquiries WHERE status = 'pending') AS pending_inquiries, \
           (SELECT COUNT(*) FROM broadcast_episodes) AS episodes, \
           (SELECT COUNT(*) FROM user_sessions WHERE expires_at > now()) AS active_sessions",
    )
    .fetch_one(pool)
    .await
    .context("failed to load dashboard stats")
}
