//! Bayesian-average ranking for restaurants.
//!
//! A restaurant's observed mean is shrunk toward the global mean rating by a
//! prior worth [`PRIOR_WEIGHT`] reviews, so a single 5-star review does not
//! outrank a hundred 4.6-star ones.

use anyhow::{Context, Result};
use sqlx::PgPool;

/// Number of pseudo-reviews the prior contributes.
pub const PRIOR_WEIGHT: f64 = 5.0;

/// Global mean used when no visible review exists anywhere.
pub const DEFAULT_PRIOR_MEAN: f64 = 3.0;

/// `score = (C*m + rating_sum) / (C + review_count)`.
pub fn bayesian_score(rating_sum: i64, review_count: i32, prior_mean: f64) -> f64 {
    let count = review_count.max(0) as f64;
    (PRIOR_WEIGHT * prior_mean + rating_sum.max(0) as f64) / (PRIOR_WEIGHT + count)
}

/// Plain average shown to users; `None` without reviews.
pub fn average_rating(rating_sum: i64, review_count: i32) -> Option<f64> {
    (review_count > 0).then(|| rating_sum as f64 / review_count as f64)
}

/// SQL for a CTE named `prior` exposing the global mean as column `m`.
///
/// Every visible review counts, including those of hidden restaurants.
pub fn prior_cte_sql() -> String {
    format!(
        "prior AS (\
            SELECT COALESCE(SUM(rating_sum)::float8 / NULLIF(SUM(review_count), 0), {DEFAULT_PRIOR_MEAN}) AS m \
            FROM restaurants\
        )"
    )
}

/// SQL expression computing the Bayesian score for alias `r` joined with `prior`.
pub fn score_sql() -> String {
    format!(
        "(({PRIOR_WEIGHT} * prior.m + r.rating_sum)::float8 / ({PRIOR_WEIGHT} + r.review_count))"
    )
}

/// Current global mean rating over visible reviews.
pub async fn global_mean(pool: &PgPool) -> Result<f64> {
    let (mean,): (f64,) = sqlx::query_as(&format!("WITH {} SELECT m FROM prior", prior_cte_sql()))
        .fetch_one(pool)
        .await
        .context("failed to compute global mean rating")?;
    Ok(mean)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_reviews_scores_prior() {
        assert!((bayesian_score(0, 0, 3.8) - 3.8).abs() < 1e-9);
        assert_eq!(average_rating(0, 0), None);
    }

    #[test]
    fn test_single_perfect_review_is_damped() {
        let score = bayesian_score(5, 1, 3.5);
        assert!(score < 4.0, "one 5-star review should stay near the prior, got {score}");
        assert!(score > 3.5);
    }

    #[test]
    fn test_many_reviews_beat_few_perfect() {
        let many = bayesian_score(460, 100, 3.5); // avg 4.6 over 100
        let few = bayesian_score(10, 2, 3.5); // avg 5.0 over 2
        assert!(many > few);
    }

    #[test]
    fn test_score_converges_to_average() {
        let score = bayesian_score(4_000_000, 1_000_000, 1.0);
        assert!((score - 4.0).abs() < 1e-3);
    }

    #[test]
    fn test_negative_inputs_are_floored() {
        assert!((bayesian_score(-10, -3, 3.0) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_sql_fragments_reference_prior() {
        assert!(prior_cte_sql().starts_with("prior AS ("));
        assert!(!prior_cte_sql().contains("is_hidden"));
        assert!(score_sql().contains("prior.m"));
        assert!(score_sql().contains("r.review_count"));
    }
}
