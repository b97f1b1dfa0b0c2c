//! Public reference data: tags, regions and broadcasts.

use axum::extract::{Path, State};
use axum::response::Json;
use axum_extra::extract::Query;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use ts_rs::TS;

use crate::data::broadcasts::{self, EpisodeListResponse};
use crate::data::models::{Broadcast, Region, TagType};
use crate::data::{regions, tags};
use crate::data::tags::TagNode;
use crate::state::AppState;
use crate::web::PageParams;
use crate::web::error::{ApiError, OptionNotFoundExt, db_error};

#[derive(Debug, Deserialize, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TagsParams {
    #[serde(rename = "type", default)]
    pub tag_type: Option<TagType>,
}

#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TagsResponse {
    /// Food categories as a tree.
    pub food: Vec<TagNode>,
    /// Flat labels.
    pub tags: Vec<TagNode>,
}

#[derive(Debug, Deserialize, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RegionsParams {
    #[serde(default)]
    pub parent_id: Option<i32>,
}

/// `GET /api/tags?type=food|tag`. Without `type`, both families are returned.
#[instrument(skip_all)]
pub async fn list_tags(
    State(state): State<AppState>,
    Query(params): Query<TagsParams>,
) -> Result<Json<TagsResponse>, ApiError> {
    let load = |tag_type: TagType| {
        let pool = state.db_pool.clone();
        async move {
            let rows = tags::list_tags(&pool, tag_type)
                .await
                .map_err(|e| db_error("List tags", e))?;
            Ok::<_, ApiError>(tags::build_tree(&rows))
        }
    };

    let want = |t: TagType| params.tag_type.is_none_or(|wanted| wanted == t);
    let food = if want(TagType::Food) { load(TagType::Food).await? } else { Vec::new() };
    let flat = if want(TagType::Tag) { load(TagType::Tag).await? } else { Vec::new() };
    Ok(Json(TagsResponse { food, tags: flat }))
}

/// `GET /api/regions?parentId=`. Direct children; top-level regions without `parentId`.
#[instrument(skip_all)]
pub async fn list_regions(
    State(state): State<AppState>,
    Query(params): Query<RegionsParams>,
) -> Result<Json<Vec<Region>>, ApiError> {
    let regions = regions::list_children(&state.db_pool, params.parent_id)
        .await
        .map_err(|e| db_error("List regions", e))?;
    Ok(Json(regions))
}

/// `GET /api/broadcasts`
#[instrument(skip_all)]
pub async fn list_broadcasts(State(state): State<AppState>) -> Result<Json<Vec<Broadcast>>, ApiError> {
    let list = broadcasts::list_broadcasts(&state.db_pool)
        .await
        .map_err(|e| db_error("List broadcasts", e))?;
    Ok(Json(list))
}

/// `GET /api/broadcasts/{code}/episodes`
#[instrument(skip_all, fields(code = %code))]
pub async fn list_episodes(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<Json<EpisodeListResponse>, ApiError> {
    let broadcast = broadcasts::get_by_code(&state.db_pool, &code)
        .await
        .map_err(|e| db_error("Broadcast lookup", e))?
        .or_not_found("Broadcast", &code)?;
    let response = broadcasts::list_episodes(&state.db_pool, broadcast, params.page, params.per_page)
        .await
        .map_err(|e| db_error("List episodes", e))?;
    Ok(Json(response))
}
