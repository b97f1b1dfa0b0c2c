//! Admin API handlers.
//!
//! All endpoints require the `AdminUser` extractor, returning 401/403 as needed.

pub mod inquiries;
pub mod restaurants;
pub mod reviews;
pub mod tags;

use axum::extract::{Path, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, instrument, trace};
use ts_rs::TS;

use crate::data::aggregates::{self, RecomputeReport};
use crate::data::dashboard::{self, DashboardStats};
use crate::data::models::{UserResponse, UserRole};
use crate::kakao::{self, SyncReport};
use crate::state::{AppState, ServiceStatus, services};
use crate::utils::fmt_duration;
use crate::web::auth::extractors::AdminUser;
use crate::web::error::{ApiError, OptionNotFoundExt, db_error};

/// Restaurants examined per Kakao sync request.
const DEFAULT_KAKAO_SYNC_LIMIT: i64 = 200;
const MAX_KAKAO_SYNC_LIMIT: i64 = 2000;

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AdminServiceInfo {
    name: String,
    status: ServiceStatus,
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DashboardResponse {
    stats: DashboardStats,
    crawl_running: bool,
    cached_sessions: usize,
    services: Vec<AdminServiceInfo>,
}

/// `GET /api/admin/dashboard`. Counters and service health.
#[instrument(skip_all)]
pub async fn dashboard(
    AdminUser(_user): AdminUser,
    State(state): State<AppState>,
) -> Result<Json<DashboardResponse>, ApiError> {
    let stats = dashboard::load_stats(&state.db_pool)
        .await
        .map_err(|e| db_error("Dashboard stats", e))?;

    let mut services: Vec<AdminServiceInfo> = state
        .service_statuses
        .all()
        .into_iter()
        .map(|(name, status, _)| AdminServiceInfo { name, status })
        .collect();
    services.sort_by(|a, b| a.name.cmp(&b.name));

    trace!(service_count = services.len(), "Fetched admin dashboard");

    Ok(Json(DashboardResponse {
        stats,
        crawl_running: state.crawler.is_running(),
        cached_sessions: state.session_cache.cached_len(),
        services,
    }))
}

/// `GET /api/admin/users`. List all users.
#[instrument(skip_all)]
pub async fn list_users(
    AdminUser(_user): AdminUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let users = crate::data::users::list_users(&state.db_pool)
        .await
        .map_err(|e| db_error("List users", e))?;

    trace!(count = users.len(), "Listed users");

    Ok(Json(users.iter().map(UserResponse::from).collect()))
}

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SetRoleBody {
    role: UserRole,
}

/// `PUT /api/admin/users/{id}/role`
#[instrument(skip_all, fields(user_id = id))]
pub async fn set_user_role(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(body): Json<SetRoleBody>,
) -> Result<Json<UserResponse>, ApiError> {
    if id == admin.id && body.role != UserRole::Admin {
        return Err(ApiError::bad_request("Admins cannot demote themselves"));
    }
    let user = crate::data::users::set_role(&state.db_pool, id, body.role)
        .await
        .map_err(|e| db_error("Set user role", e))?
        .or_not_found("User", id)?;

    state.session_cache.evict_user(id);
    info!(user_id = id, role = body.role.as_str(), "Updated user role");

    Ok(Json(UserResponse::from(&user)))
}

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SetActiveBody {
    is_active: bool,
}

/// `PUT /api/admin/users/{id}/active`. Deactivation also ends the user's sessions.
#[instrument(skip_all, fields(user_id = id))]
pub async fn set_user_active(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(body): Json<SetActiveBody>,
) -> Result<Json<UserResponse>, ApiError> {
    if id == admin.id && !body.is_active {
        return Err(ApiError::bad_request("Admins cannot deactivate themselves"));
    }
    let user = crate::data::users::set_active(&state.db_pool, id, body.is_active)
        .await
        .map_err(|e| db_error("Set user active", e))?
        .or_not_found("User", id)?;

    state.session_cache.evict_user(id);
    info!(user_id = id, is_active = body.is_active, "Updated user active flag");

    Ok(Json(UserResponse::from(&user)))
}

/// `POST /api/admin/aggregates/recompute`. Rebuild rating and like counters.
#[instrument(skip_all)]
pub async fn recompute_aggregates(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
) -> Result<Json<RecomputeReport>, ApiError> {
    let start = Instant::now();
    let report = aggregates::recompute_all(&state.db_pool)
        .await
        .map_err(|e| db_error("Recompute aggregates", e))?;
    info!(
        admin_id = admin.id,
        restaurants_fixed = report.restaurants_fixed,
        reviews_fixed = report.reviews_fixed,
        duration = fmt_duration(start.elapsed()),
        "Aggregates recomputed"
    );
    Ok(Json(report))
}

#[derive(Debug, Default, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct KakaoSyncBody {
    #[serde(default)]
    #[ts(type = "number | null")]
    limit: Option<i64>,
}

/// `POST /api/admin/kakao/sync`. Attach Kakao place ids and coordinates.
#[instrument(skip_all)]
pub async fn kakao_sync(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    body: Option<Json<KakaoSyncBody>>,
) -> Result<Json<SyncReport>, ApiError> {
    let limit = body
        .and_then(|Json(b)| b.limit)
        .unwrap_or(DEFAULT_KAKAO_SYNC_LIMIT)
        .clamp(1, MAX_KAKAO_SYNC_LIMIT);

    state.service_statuses.set(services::KAKAO, ServiceStatus::Busy);
    let result = kakao::sync_restaurants(&state.db_pool, &state.kakao, limit).await;
    let settled = match &result {
        Ok(_) => ServiceStatus::Active,
        Err(crate::kakao::KakaoError::NotConfigured) => ServiceStatus::Disabled,
        Err(_) => ServiceStatus::Error,
    };
    state.service_statuses.set(services::KAKAO, settled);

    let report = result?;
    info!(admin_id = admin.id, limit, matched = report.matched, "Kakao sync finished");
    Ok(Json(report))
}
