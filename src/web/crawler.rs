//! Crawler control endpoints.

use axum::extract::State;
use axum::response::Json;
use serde::Deserialize;
use std::time::Instant;
use tracing::{info, instrument, warn};
use ts_rs::TS;

use crate::crawler::service::{CrawlReport, CrawlStatus};
use crate::state::{AppState, ServiceStatus, services};
use crate::utils::fmt_duration;
use crate::web::auth::extractors::AdminUser;
use crate::web::error::ApiError;

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CrawlRequest {
    /// Broadcast code, e.g. `TASTY_GUYS`.
    pub broadcast: String,
    pub start: i32,
    /// Inclusive; defaults to the latest aired episode.
    #[serde(default)]
    pub end: Option<i32>,
}

/// `POST /api/crawler/run`. Runs to completion and returns the report.
///
/// Only one crawl may run at a time; a second request gets 409.
#[instrument(skip_all, fields(broadcast = %body.broadcast, start = body.start))]
pub async fn run(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Json(body): Json<CrawlRequest>,
) -> Result<Json<CrawlReport>, ApiError> {
    let started = Instant::now();
    state.service_statuses.set(services::CRAWLER, ServiceStatus::Busy);
    let result = state.crawler.crawl(&body.broadcast, body.start, body.end).await;
    state.service_statuses.set(
        services::CRAWLER,
        if state.crawler.is_running() {
            ServiceStatus::Busy
        } else {
            ServiceStatus::Active
        },
    );

    match result {
        Ok(report) => {
            info!(
                admin_id = admin.id,
                success = report.success,
                skipped = report.skipped,
                failed = report.failed.len(),
                duration = fmt_duration(started.elapsed()),
                "crawl finished"
            );
            Ok(Json(report))
        }
        Err(e) => {
            warn!(admin_id = admin.id, error = %e, "crawl request rejected");
            Err(e.into())
        }
    }
}

/// `GET /api/crawler/status`
#[instrument(skip_all)]
pub async fn status(AdminUser(_user): AdminUser, State(state): State<AppState>) -> Json<CrawlStatus> {
    Json(state.crawler.status().await)
}
