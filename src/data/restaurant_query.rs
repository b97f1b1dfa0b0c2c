//! Restaurant list/search query composition.
//!
//! Filters compose with AND. Tag filters use intersection semantics: a
//! restaurant must carry *every* requested tag, expressed as
//! `GROUP BY restaurant_id HAVING COUNT(DISTINCT tag_id) = N`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use ts_rs::TS;

use super::ranking::{self, average_rating};
use super::regions::push_subtree_filter;
use crate::utils::paginate;

/// Default and maximum page sizes for restaurant lists.
pub const DEFAULT_PER_PAGE: i64 = 20;
pub const MAX_PER_PAGE: i64 = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum RestaurantSort {
    /// Bayesian-average score.
    #[default]
    Score,
    /// Review count plus like count.
    Popular,
    /// Raw average rating.
    Rating,
    Reviews,
    Latest,
    Name,
}

impl RestaurantSort {
    fn order_by(self) -> &'static str {
        match self {
            Self::Score => "score DESC, r.review_count DESC, r.id DESC",
            Self::Popular => "(r.review_count + r.like_count) DESC, score DESC, r.id DESC",
            Self::Rating => {
                "(r.rating_sum::float8 / NULLIF(r.review_count, 0)) DESC NULLS LAST, \
                 r.review_count DESC, r.id DESC"
            }
            Self::Reviews => "r.review_count DESC, score DESC, r.id DESC",
            Self::Latest => "r.created_at DESC, r.id DESC",
            Self::Name => "r.name ASC, r.id ASC",
        }
    }
}

/// Resolved filter set. Food categories arrive as a materialized path prefix.
#[derive(Debug, Clone, Default)]
pub struct RestaurantFilter {
    pub query: Option<String>,
    pub region_id: Option<i32>,
    pub food_path: Option<String>,
    pub tag_ids: Vec<i32>,
    pub broadcast_id: Option<i32>,
    /// Only restaurants this user has liked.
    pub liked_by: Option<i32>,
    pub include_hidden: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ListOptions {
    pub sort: RestaurantSort,
    pub page: i64,
    pub per_page: i64,
    pub viewer_id: Option<i32>,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            sort: RestaurantSort::Score,
            page: 1,
            per_page: DEFAULT_PER_PAGE,
            viewer_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RestaurantSummary {
    pub id: i32,
    pub name: String,
    pub address: String,
    pub region_name: Option<String>,
    pub main_menu: Option<String>,
    pub thumbnail_url: Option<String>,
    pub tags: Vec<String>,
    pub average_rating: Option<f64>,
    pub score: f64,
    pub review_count: i32,
    pub like_count: i32,
    pub liked_by_me: bool,
    pub on_broadcast: bool,
    pub is_hidden: bool,
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RestaurantListResponse {
    pub restaurants: Vec<RestaurantSummary>,
    #[ts(type = "number")]
    pub total: i64,
    #[ts(type = "number")]
    pub page: i64,
    #[ts(type = "number")]
    pub per_page: i64,
}

#[derive(sqlx::FromRow)]
struct RestaurantListRow {
    id: i32,
    name: String,
    address: String,
    region_name: Option<String>,
    main_menu: Option<String>,
    thumbnail_url: Option<String>,
    tags: Vec<String>,
    rating_sum: i64,
    review_count: i32,
    like_count: i32,
    score: f64,
    liked_by_me: bool,
    on_broadcast: bool,
    is_hidden: bool,
}

impl From<RestaurantListRow> for RestaurantSummary {
    fn from(row: RestaurantListRow) -> Self {
        Self {
            average_rating: average_rating(row.rating_sum, row.review_count),
            id: row.id,
            name: row.name,
            address: row.address,
            region_name: row.region_name,
            main_menu: row.main_menu,
            thumbnail_url: row.thumbnail_url,
            tags: row.tags,
            score: row.score,
            review_count: row.review_count,
            like_count: row.like_count,
            liked_by_me: row.liked_by_me,
            on_broadcast: row.on_broadcast,
            is_hidden: row.is_hidden,
        }
    }
}

/// Escape LIKE metacharacters and wrap the term for a substring match.
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

/// Sorted, de-duplicated tag ids; intersection semantics need a distinct count.
fn distinct_tags(tag_ids: &[i32]) -> Vec<i32> {
    let mut ids = tag_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Append `AND ...` conditions for every active filter.
fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &RestaurantFilter) {
    if !filter.include_hidden {
        qb.push(" AND NOT r.is_hidden");
    }

    if let Some(term) = filter.query.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        let pattern = like_pattern(term);
        qb.push(" AND (r.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR r.address ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR COALESCE(r.main_menu, '') ILIKE ")
            .push_bind(pattern)
            .push(")");
    }

    if let Some(region_id) = filter.region_id {
        qb.push(" AND ");
        push_subtree_filter(qb, "r.region_id", region_id);
    }

    if let Some(path) = &filter.food_path {
        qb.push(
            " AND EXISTS (SELECT 1 FROM restaurant_tags frt JOIN tags ft ON ft.id = frt.tag_id \
             WHERE frt.restaurant_id = r.id AND ft.type = 'food' AND ft.path LIKE ",
        )
        .push_bind(format!("{path}%"))
        .push(")");
    }

    let tag_ids = distinct_tags(&filter.tag_ids);
    if !tag_ids.is_empty() {
        let wanted = tag_ids.len() as i64;
        qb.push(
            " AND r.id IN (SELECT rt.restaurant_id FROM restaurant_tags rt \
             WHERE rt.tag_id = ANY(",
        )
        .push_bind(tag_ids)
        .push(") GROUP BY rt.restaurant_id HAVING COUNT(DISTINCT rt.tag_id) = ")
        .push_bind(wanted)
        .push(")");
    }

    if let Some(broadcast_id) = filter.broadcast_id {
        qb.push(
            " AND EXISTS (SELECT 1 FROM broadcast_restaurants br \
             JOIN broadcast_episodes be ON be.id = br.episode_id \
             WHERE br.restaurant_id = r.id AND be.broadcast_id = ",
        )
        .push_bind(broadcast_id)
        .push(")");
    }

    if let Some(user_id) = filter.liked_by {
        qb.push(" AND EXISTS (SELECT 1 FROM restaurant_likes ml WHERE ml.restaurant_id = r.id AND ml.user_id = ")
            .push_bind(user_id)
            .push(")");
    }
}

/// Build the paginated list query.
pub fn build_list_query(filter: &RestaurantFilter, opts: &ListOptions) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("WITH {} ", ranking::prior_cte_sql()));
    qb.push(format!(
        "SELECT r.id, r.name, r.address, rg.name AS region_name, r.main_menu, \
         (SELECT p.url FROM restaurant_photos p WHERE p.restaurant_id = r.id \
          ORDER BY p.sort_order, p.id LIMIT 1) AS thumbnail_url, \
         COALESCE((SELECT array_agg(t.name ORDER BY t.type, t.name) FROM restaurant_tags rt \
          JOIN tags t ON t.id = rt.tag_id WHERE rt.restaurant_id = r.id), ARRAY[]::text[]) AS tags, \
         r.rating_sum, r.review_count, r.like_count, {score} AS score, \
         EXISTS (SELECT 1 FROM broadcast_restaurants obr WHERE obr.restaurant_id = r.id) AS on_broadcast, \
         r.is_hidden, ",
        score = ranking::score_sql()
    ));

    match opts.viewer_id {
        Some(viewer) => {
            qb.push(
                "EXISTS (SELECT 1 FROM restaurant_likes l \
                 WHERE l.restaurant_id = r.id AND l.user_id = ",
            )
            .push_bind(viewer)
            .push(") AS liked_by_me");
        }
        None => {
            qb.push("FALSE AS liked_by_me");
        }
    }

    qb.push(" FROM restaurants r CROSS JOIN prior LEFT JOIN regions rg ON rg.id = r.region_id WHERE TRUE");
    push_filters(&mut qb, filter);

    let (_, per_page, offset) = paginate(Some(opts.page), Some(opts.per_page), DEFAULT_PER_PAGE, MAX_PER_PAGE);
    qb.push(" ORDER BY ")
        .push(opts.sort.order_by())
        .push(" LIMIT ")
        .push_bind(per_page)
        .push(" OFFSET ")
        .push_bind(offset);
    qb
}

/// Build the matching `COUNT(*)` query.
pub fn build_count_query(filter: &RestaurantFilter) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM restaurants r WHERE TRUE");
    push_filters(&mut qb, filter);
    qb
}

/// Run a filtered, paginated restaurant listing.
pub async fn list_restaurants(
    pool: &PgPool,
    filter: &RestaurantFilter,
    opts: &ListOptions,
) -> Result<RestaurantListResponse> {
    let (page, per_page, _) = paginate(Some(opts.page), Some(opts.per_page), DEFAULT_PER_PAGE, MAX_PER_PAGE);

    let mut count_qb = build_count_query(filter);
    let (total,): (i64,) = count_qb
        .build_query_as()
        .fetch_one(pool)
        .await
        .context("failed to count restaurants")?;

    let mut list_qb = build_list_query(filter, opts);
    let rows: Vec<RestaurantListRow> = list_qb
        .build_query_as()
        .fetch_all(pool)
        .await
        .context("failed to list restaurants")?;

    Ok(RestaurantListResponse {
        restaurants: rows.into_iter().map(RestaurantSummary::from).collect(),
        total,
        page,
        per_page,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("국밥"), "%국밥%");
        assert_eq!(like_pattern("100%_done"), "%100\\%\\_done%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn test_unfiltered_query_excludes_hidden_only() {
        let qb = build_count_query(&RestaurantFilter::default());
        assert_eq!(
            qb.sql(),
            "SELECT COUNT(*) FROM restaurants r WHERE TRUE AND NOT r.is_hidden"
        );
    }

    #[test]
    fn test_include_hidden_drops_visibility_filter() {
        let filter = RestaurantFilter {
            include_hidden: true,
            ..Default::default()
        };
        assert!(!build_count_query(&filter).sql().contains("is_hidden"));
    }

    #[test]
    fn test_tag_filter_uses_intersection() {
        let filter = RestaurantFilter {
            tag_ids: vec![3, 1, 3],
            ..Default::default()
        };
        let qb = build_count_query(&filter);
        let sql = qb.sql();
        assert!(sql.contains("rt.tag_id = ANY($1)"));
        assert!(sql.contains("HAVING COUNT(DISTINCT rt.tag_id) = $2"));
        assert_eq!(distinct_tags(&filter.tag_ids), vec![1, 3]);
    }

    #[test]
    fn test_blank_query_is_ignored() {
        let filter = RestaurantFilter {
            query: Some("   ".into()),
            ..Default::default()
        };
        assert!(!build_count_query(&filter).sql().contains("ILIKE"));
    }

    #[test]
    fn test_all_filters_bind_in_order() {
        let filter = RestaurantFilter {
            query: Some("냉면".into()),
            region_id: Some(11),
            food_path: Some("/1/2/".into()),
            tag_ids: vec![5, 6],
            broadcast_id: Some(1),
            liked_by: None,
            include_hidden: false,
        };
        let qb = build_count_query(&filter);
        let sql = qb.sql();
        // keyword (3) + region (3) + food path (1) + tags (2) + broadcast (1)
        assert!(sql.contains("r.name ILIKE $1"));
        assert!(sql.contains("p.parent_id = $6"));
        assert!(sql.contains("ft.path LIKE $7"));
        assert!(sql.contains("ANY($8)"));
        assert!(sql.contains("= $9)"));
        assert!(sql.contains("be.broadcast_id = $10"));
    }

    #[test]
    fn test_list_query_orders_and_paginates() {
        let opts = ListOptions {
            sort: RestaurantSort::Popular,
            page: 3,
            per_page: 500,
            viewer_id: Some(42),
        };
        let qb = build_list_query(&RestaurantFilter::default(), &opts);
        let sql = qb.sql();
        assert!(sql.starts_with("WITH prior AS ("));
        assert!(sql.contains("l.user_id = $1) AS liked_by_me"));
        assert!(sql.contains("ORDER BY (r.review_count + r.like_count) DESC"));
        assert!(sql.ends_with("LIMIT $2 OFFSET $3"));
    }

    #[test]
    fn test_list_query_without_viewer_has_constant_like_flag() {
        let qb = build_list_query(&RestaurantFilter::default(), &ListOptions::default());
        assert!(qb.sql().contains("FALSE AS liked_by_me"));
        assert!(qb.sql().contains("ORDER BY score DESC"));
    }

    #[test]
    fn test_sort_deserializes_from_snake_case() {
        let sort: RestaurantSort = serde_json::from_str("\"popular\"").unwrap();
        assert_eq!(sort, RestaurantSort::Popular);
        let sort: RestaurantSort = serde_json::from_str("\"latest\"").unwrap();
        assert_eq!(sort, RestaurantSort::Latest);
    }
}
