//! Health and status handlers.

use axum::extract::State;
use axum::response::Json;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use tracing::{trace, warn};
use ts_rs::TS;

use crate::state::{AppState, ServiceStatus, services};

#[derive(Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ServiceInfo {
    name: String,
    status: ServiceStatus,
    #[ts(type = "number")]
    since_secs: u64,
}

#[derive(Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StatusResponse {
    status: ServiceStatus,
    version: String,
    commit: String,
    crawl_running: bool,
    services: BTreeMap<String, ServiceInfo>,
}

/// Health check endpoint
pub(super) async fn health() -> Json<Value> {
    trace!("health check requested");
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

fn overall_status(services: &BTreeMap<String, ServiceInfo>) -> ServiceStatus {
    if services.values().any(|s| s.status == ServiceStatus::Error) {
        ServiceStatus::Error
    } else if services.is_empty() {
        ServiceStatus::Disabled
    } else if services.values().any(|s| s.status == ServiceStatus::Starting) {
        ServiceStatus::Starting
    } else {
        ServiceStatus::Active
    }
}

/// Status endpoint showing service health and build info.
pub(super) async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    // Probe the database so a lost connection shows up here rather than only in handler errors.
    let db_ok = sqlx::query("SELECT 1").execute(&state.db_pool).await;
    match db_ok {
        Ok(_) => {
            if state.service_statuses.get(services::DATABASE) != Some(ServiceStatus::Active) {
                state.service_statuses.set(services::DATABASE, ServiceStatus::Active);
            }
        }
        Err(e) => {
            warn!(error = %e, "database probe failed");
            state.service_statuses.set(services::DATABASE, ServiceStatus::Error);
        }
    }

    let services: BTreeMap<String, ServiceInfo> = state
        .service_statuses
        .all()
        .into_iter()
        .map(|(name, status, since_secs)| {
            (
                name.clone(),
                ServiceInfo {
                    name,
                    status,
                    since_secs,
                },
            )
        })
        .collect();

    Json(StatusResponse {
        status: overall_status(&services),
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: env!("GIT_COMMIT_HASH").to_string(),
        crawl_running: state.crawler.is_running(),
        services,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(status: ServiceStatus) -> ServiceInfo {
        ServiceInfo {
            name: String::new(),
            status,
            since_secs: 0,
        }
    }

    #[test]
    fn test_overall_status() {
        let mut services = BTreeMap::new();
        assert_eq!(overall_status(&services), ServiceStatus::Disabled);

        services.insert("database".into(), info(ServiceStatus::Active));
        services.insert("kakao".into(), info(ServiceStatus::Disabled));
        services.insert("crawler".into(), info(ServiceStatus::Busy));
        assert_eq!(overall_status(&services), ServiceStatus::Active);

        services.insert("database".into(), info(ServiceStatus::Error));
        assert_eq!(overall_status(&services), ServiceStatus::Error);
    }
}
