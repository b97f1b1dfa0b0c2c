//! Tag catalogue. Food tags are a tree encoded as a materialized path
//! (`/1/4/9/`); plain tags are flat.

use anyhow::{Context, Result, bail};
use serde::Serialize;
use sqlx::PgPool;
use ts_rs::TS;

use super::models::{Tag, TagType};

const TAG_COLUMNS: &str = "id, type, name, parent_id, path, depth, sort_order";

/// Maximum nesting depth of food tags.
pub const MAX_FOOD_DEPTH: i16 = 3;

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TagNode {
    pub id: i32,
    pub name: String,
    #[serde(rename = "type")]
    pub tag_type: TagType,
    pub path: String,
    pub depth: i16,
    pub children: Vec<TagNode>,
}

impl TagNode {
    pub fn leaf(tag: &Tag) -> Self {
        Self {
            id: tag.id,
            name: tag.name.clone(),
            tag_type: TagType::parse(&tag.tag_type).unwrap_or(TagType::Tag),
            path: tag.path.clone(),
            depth: tag.depth,
            children: Vec::new(),
        }
    }
}

/// Compute the materialized path for a tag given its parent's path.
pub fn child_path(parent_path: Option<&str>, id: i32) -> String {
    match parent_path {
        Some(parent) => format!("{parent}{id}/"),
        None => format!("/{id}/"),
    }
}

/// Assemble a forest from rows ordered by `path` (parents before children).
///
/// Rows whose parent is missing from the set become roots.
pub fn build_tree(tags: &[Tag]) -> Vec<TagNode> {
    fn insert(nodes: &mut Vec<TagNode>, tag: &Tag) -> bool {
        for node in nodes.iter_mut() {
            if Some(node.id) == tag.parent_id {
                node.children.push(TagNode::leaf(tag));
                return true;
            }
            if tag.path.starts_with(&node.path) && insert(&mut node.children, tag) {
                return true;
            }
        }
        false
    }

    let mut sorted: Vec<&Tag> = tags.iter().collect();
    sorted.sort_by(|a, b| {
        a.depth
            .cmp(&b.depth)
            .then(a.sort_order.cmp(&b.sort_order))
            .then(a.name.cmp(&b.name))
    });

    let mut roots: Vec<TagNode> = Vec::new();
    for tag in sorted {
        if tag.parent_id.is_none() || !insert(&mut roots, tag) {
            roots.push(TagNode::leaf(tag));
        }
    }
    roots
}

pub async fn list_tags(pool: &PgPool, tag_type: TagType) -> Result<Vec<Tag>> {
    sqlx::query_as::<_, Tag>(&format!(
        "SELECT {TAG_COLUMNS} FROM tags WHERE type = $1 ORDER BY path, sort_order, name"
    ))
    .bind(tag_type.as_str())
    .fetch_all(pool)
    .await
    .context("failed to list tags")
}

pub async fn get_tag(pool: &PgPool, id: i32) -> Result<Option<Tag>> {
    sqlx::query_as::<_, Tag>(&format!("SELECT {TAG_COLUMNS} FROM tags WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch tag")
}

/// Create a tag. Food tags may nest under another food tag; plain tags are flat.
pub async fn create_tag(
    pool: &PgPool,
    tag_type: TagType,
    name: &str,
    parent_id: Option<i32>,
    sort_order: i32,
) -> Result<Tag> {
    let mut tx = pool.begin().await?;

    let parent = match parent_id {
        Some(pid) => {
            if tag_type == TagType::Tag {
                bail!("plain tags cannot have a parent");
            }
            let parent = sqlx::query_as::<_, Tag>(&format!(
                "SELECT {TAG_COLUMNS} FROM tags WHERE id = $1"
            ))
            .bind(pid)
            .fetch_optional(&mut *tx)
            .await?
            .with_context(|| format!("parent tag {pid} not found"))?;
            if parent.tag_type != TagType::Food.as_str() {
                bail!("parent tag {pid} is not a food tag");
            }
            if parent.depth >= MAX_FOOD_DEPTH {
                bail!("food tags nest at most {MAX_FOOD_DEPTH} levels");
            }
            Some(parent)
        }
        None => None,
    };

    let depth = parent.as_ref().map_or(1, |p| p.depth + 1);
    let (id,): (i32,) = sqlx::query_as(
        "INSERT INTO tags (type, name, parent_id, depth, sort_order) \
         VALUES ($1, $2, $3, $4, $5) RETURNING id",
    )
    .bind(tag_type.as_str())
    .bind(name)
    .bind(parent_id)
    .bind(depth)
    .bind(sort_order)
    .fetch_one(&mut *tx)
    .await
    .context("failed to insert tag")?;

    let path = child_path(parent.as_ref().map(|p| p.path.as_str()), id);
    let tag = sqlx::query_as::<_, Tag>(&format!(
        "UPDATE tags SET path = $2 WHERE id = $1 RETURNING {TAG_COLUMNS}"
    ))
    .bind(id)
    .bind(&path)
    .fetch_one(&mut *tx)
    .await
    .context("failed to set tag path")?;

    tx.commit().await?;
    Ok(tag)
}

/// Delete a tag and its whole subtree. Returns the number of tags removed.
pub async fn delete_tag_subtree(pool: &PgPool, id: i32) -> Result<u64> {
    let Some(tag) = get_tag(pool, id).await? else {
        return Ok(0);
    };
    let result = sqlx::query("DELETE FROM tags WHERE path LIKE $1 || '%'")
        .bind(&tag.path)
        .execute(pool)
        .await
        .context("failed to delete tag subtree")?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(id: i32, parent_id: Option<i32>, path: &str, name: &str) -> Tag {
        Tag {
            id,
            tag_type: "food".into(),
            name: name.into(),
            parent_id,
            path: path.into(),
            depth: path.matches('/').count() as i16 - 1,
            sort_order: 0,
        }
    }

    #[test]
    fn test_child_path() {
        assert_eq!(child_path(None, 4), "/4/");
        assert_eq!(child_path(Some("/4/"), 9), "/4/9/");
        assert_eq!(child_path(Some("/4/9/"), 12), "/4/9/12/");
    }

    #[test]
    fn test_build_tree_nests_by_parent() {
        let tags = vec![
            tag(1, None, "/1/", "한식"),
            tag(2, Some(1), "/1/2/", "국밥"),
            tag(3, Some(2), "/1/2/3/", "돼지국밥"),
            tag(4, None, "/4/", "일식"),
            tag(5, Some(4), "/4/5/", "초밥"),
        ];
        let tree = build_tree(&tags);
        assert_eq!(tree.len(), 2);
        let korean = tree.iter().find(|n| n.id == 1).unwrap();
        assert_eq!(korean.children.len(), 1);
        assert_eq!(korean.children[0].children[0].name, "돼지국밥");
        let japanese = tree.iter().find(|n| n.id == 4).unwrap();
        assert_eq!(japanese.children[0].id, 5);
    }

    #[test]
    fn test_build_tree_orphans_become_roots() {
        let tags = vec![tag(7, Some(99), "/99/7/", "고아")];
        let tree = build_tree(&tags);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].id, 7);
    }

    #[test]
    fn test_build_tree_input_order_does_not_matter() {
        let tags = vec![
            tag(3, Some(2), "/1/2/3/", "c"),
            tag(2, Some(1), "/1/2/", "b"),
            tag(1, None, "/1/", "a"),
        ];
        let tree = build_tree(&tags);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].children[0].children[0].id, 3);
    }
}
