//! Administrative regions: a three-level parent-pointer hierarchy.

use anyhow::{Context, Result};
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::models::Region;

/// List the direct children of `parent_id`, or the top-level regions when `None`.
pub async fn list_children(pool: &PgPool, parent_id: Option<i32>) -> Result<Vec<Region>> {
    sqlx::query_as::<_, Region>(
        "SELECT id, name, parent_id, depth FROM regions \
         WHERE parent_id IS NOT DISTINCT FROM $1 ORDER BY name",
    )
    .bind(parent_id)
    .fetch_all(pool)
    .await
    .context("failed to list regions")
}

pub async fn get_region(pool: &PgPool, id: i32) -> Result<Option<Region>> {
    sqlx::query_as::<_, Region>("SELECT id, name, parent_id, depth FROM regions WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch region")
}

/// Append a predicate matching `column` against `region_id` and all of its descendants.
///
/// The hierarchy is at most three levels deep, so two hops cover every descendant.
pub fn push_subtree_filter(qb: &mut QueryBuilder<'_, Postgres>, column: &str, region_id: i32) {
    qb.push(column)
        .push(
            " IN (SELECT g.id FROM regions g LEFT JOIN regions p ON p.id = g.parent_id \
             WHERE g.id = ",
        )
        .push_bind(region_id)
        .push(" OR g.parent_id = ")
        .push_bind(region_id)
        .push(" OR p.parent_id = ")
        .push_bind(region_id)
        .push(")");
}

/// Best-effort region lookup from a Korean address.
///
/// Walks the leading address tokens down the hierarchy (`서울특별시 마포구 ...`)
/// and returns the deepest region reached.
pub async fn resolve_from_address(pool: &PgPool, address: &str) -> Result<Option<i32>> {
    let mut parent: Option<i32> = None;
    let mut resolved = None;
    for token in address.split_whitespace().take(3) {
        let found: Option<(i32,)> = sqlx::query_as(
            "SELECT id FROM regions WHERE parent_id IS NOT DISTINCT FROM $1 \
             AND (name = $2 OR $2 LIKE name || '%' OR name LIKE $2 || '%') \
             ORDER BY length(name) DESC LIMIT 1",
        )
        .bind(parent)
        .bind(token)
        .fetch_optional(pool)
        .await
        .context("failed to resolve region")?;
        match found {
            Some((id,)) => {
                parent = Some(id);
                resolved = Some(id);
            }
            None => break,
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtree_filter_covers_three_levels() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 FROM restaurants r WHERE ");
        push_subtree_filter(&mut qb, "r.region_id", 7);
        let sql = qb.sql();
        assert!(sql.contains("r.region_id IN (SELECT g.id FROM regions g"));
        assert!(sql.contains("g.id = $1 OR g.parent_id = $2 OR p.parent_id = $3"));
    }
}
