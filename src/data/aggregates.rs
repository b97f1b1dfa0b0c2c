//! Rebuild denormalized counters from their source tables.
//!
//! Normal writes keep the counters exact; this exists to repair drift after
//! manual edits or restores.

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::PgPool;
use ts_rs::TS;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RecomputeReport {
    /// Restaurants whose rating/review/like counters changed.
    #[ts(type = "number")]
    pub restaurants_fixed: u64,
    /// Reviews whose like counter changed.
    #[ts(type = "number")]
    pub reviews_fixed: u64,
}

/// Recompute every aggregate in one transaction. Only drifted rows are written.
#[tracing::instrument(skip(pool))]
pub async fn recompute_all(pool: &PgPool) -> Result<RecomputeReport> {
    let mut tx = pool.begin().await?;

    let restaurants_fixed = sqlx::query(
        "WITH actual AS ( \
             SELECT r.id, \
                    COALESCE(rv.rating_sum, 0)::bigint AS rating_sum, \
                    COALESCE(rv.review_count, 0)::int AS review_count, \
                    COALESCE(lk.like_count, 0)::int AS like_count \
             FROM restaurants r \
             LEFT JOIN (SELECT restaurant_id, SUM(rating) AS rating_sum, COUNT(*) AS review_count \
                        FROM reviews WHERE NOT is_hidden GROUP BY restaurant_id) rv ON rv.restaurant_id = r.id \
             LEFT JOIN (SELECT restaurant_id, COUNT(*) AS like_count \
                        FROM restaurant_likes GROUP BY restaurant_id) lk ON lk.restaurant_id = r.id \
         ) \
         UPDATE restaurants r SET rating_sum = a.rating_sum, review_count = a.review_count, \
                like_count = a.like_count \
         FROM actual a \
         WHERE a.id = r.id AND (r.rating_sum, r.review_count, r.like_count) \
               IS DISTINCT FROM (a.rating_sum, a.review_count, a.like_count)",
    )
    .execute(&mut *tx)
    .await
    .context("failed to recompute restaurant aggregates")?
    .rows_affected();

    let reviews_fixed = sqlx::query(
        "WITH actual AS ( \
             SELECT rv.id, COALESCE(lk.like_count, 0)::int AS like_count \
             FROM reviews rv \
             LEFT JOIN (SELECT review_id, COUNT(*) AS like_count FROM review_likes GROUP BY review_id) lk \
                    ON lk.review_id = rv.id \
         ) \
         UPDATE reviews rv SET like_count = a.like_count FROM actual a \
         WHERE a.id = rv.id AND rv.like_count <> a.like_count",
    )
    .execute(&mut *tx)
    .await
    .context("failed to recompute review like counts")?
    .rows_affected();

    tx.commit().await?;

    if restaurants_fixed > 0 || reviews_fixed > 0 {
        tracing::warn!(restaurants_fixed, reviews_fixed, "repaired drifted aggregates");
    } else {
        tracing::info!("aggregates already consistent");
    }
    Ok(RecomputeReport {
        restaurants_fixed,
        reviews_fixed,
    })
}
