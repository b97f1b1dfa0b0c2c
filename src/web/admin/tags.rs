//! Tag catalogue administration.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use tracing::{info, instrument};
use ts_rs::TS;

use crate::data::models::TagType;
use crate::data::tags::{self, TagNode};
use crate::state::AppState;
use crate::web::auth::extractors::AdminUser;
use crate::web::error::{ApiError, db_error, is_unique_violation};

const MAX_TAG_NAME_CHARS: usize = 50;

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateTagBody {
    #[serde(rename = "type")]
    pub tag_type: TagType,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<i32>,
    #[serde(default)]
    pub sort_order: i32,
}

/// Map a tag-creation failure. Database errors are 409 on duplicates and 500
/// otherwise; anything else is a rejected input.
fn create_error(e: anyhow::Error) -> ApiError {
    if is_unique_violation(&e) {
        ApiError::conflict("A tag with this name already exists here")
    } else if e.chain().any(|c| c.is::<sqlx::Error>()) {
        db_error("Create tag", e)
    } else {
        ApiError::bad_request(e.to_string())
    }
}

/// `POST /api/admin/tags`
#[instrument(skip_all)]
pub async fn create(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Json(body): Json<CreateTagBody>,
) -> Result<(StatusCode, Json<TagNode>), ApiError> {
    let name = body.name.trim();
    if name.is_empty() || name.chars().count() > MAX_TAG_NAME_CHARS {
        return Err(ApiError::bad_request(format!(
            "name must be 1 to {MAX_TAG_NAME_CHARS} characters"
        )));
    }

    let tag = tags::create_tag(&state.db_pool, body.tag_type, name, body.parent_id, body.sort_order)
        .await
        .map_err(create_error)?;
    info!(admin_id = admin.id, tag_id = tag.id, path = %tag.path, "tag created");
    Ok((StatusCode::CREATED, Json(TagNode::leaf(&tag))))
}

/// `DELETE /api/admin/tags/{id}`. Removes the tag with all of its descendants.
#[instrument(skip_all, fields(tag_id = id))]
pub async fn delete(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    let removed = tags::delete_tag_subtree(&state.db_pool, id)
        .await
        .map_err(|e| db_error("Delete tag", e))?;
    if removed == 0 {
        return Err(ApiError::not_found(format!("Tag {id} not found")));
    }
    info!(admin_id = admin.id, tag_id = id, removed, "tag subtree deleted");
    Ok(StatusCode::NO_CONTENT)
}
