//! Application state shared by the web layer and batch jobs.

use crate::config::Config;
use crate::crawler::{CrawlService, ScraperRegistry};
use crate::kakao::KakaoClient;
use crate::uploads::UploadStore;
use crate::web::auth::session::SessionCache;
use dashmap::DashMap;
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;
use ts_rs::TS;

/// Health status of a service.
#[derive(Debug, Clone, Serialize, PartialEq, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ServiceStatus {
    Starting,
    Active,
    /// Running a batch job right now.
    Busy,
    Disabled,
    Error,
}

/// A timestamped status entry for a service.
#[derive(Debug, Clone)]
pub struct StatusEntry {
    pub status: ServiceStatus,
    pub updated_at: Instant,
}

/// Thread-safe registry for services to self-report their health status.
#[derive(Debug, Clone, Default)]
pub struct ServiceStatusRegistry {
    inner: Arc<DashMap<String, StatusEntry>>,
}

impl ServiceStatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or updates the status for a named service.
    pub fn set(&self, name: &str, status: ServiceStatus) {
        self.inner.insert(
            name.to_owned(),
            StatusEntry {
                status,
                updated_at: Instant::now(),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<ServiceStatus> {
        self.inner.get(name).map(|entry| entry.status.clone())
    }

    /// Returns a snapshot of all statuses with seconds since their last change.
    pub fn all(&self) -> Vec<(String, ServiceStatus, u64)> {
        self.inner
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry.value().status.clone(),
                    entry.value().updated_at.elapsed().as_secs(),
                )
            })
            .collect()
    }
}

/// Service names used in the status registry.
pub mod services {
    pub const DATABASE: &str = "database";
    pub const CRAWLER: &str = "crawler";
    pub const KAKAO: &str = "kakao";
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db_pool: PgPool,
    pub service_statuses: ServiceStatusRegistry,
    pub session_cache: SessionCache,
    pub uploads: UploadStore,
    pub kakao: Arc<KakaoClient>,
    pub crawler: Arc<CrawlService>,
}

impl AppState {
    pub fn new(config: Config, db_pool: PgPool, http: reqwest::Client, registry: ScraperRegistry) -> Self {
        let service_statuses = ServiceStatusRegistry::new();
        service_statuses.set(services::DATABASE, ServiceStatus::Active);

        let kakao = Arc::new(KakaoClient::new(
            http,
            &config.kakao_api_base_url,
            config.kakao_rest_api_key.clone(),
            config.kakao_requests_per_second,
        ));
        service_statuses.set(
            services::KAKAO,
            if kakao.is_configured() {
                ServiceStatus::Active
            } else {
                ServiceStatus::Disabled
            },
        );

        service_statuses.set(
            services::CRAWLER,
            if registry.codes().is_empty() {
                ServiceStatus::Disabled
            } else {
                ServiceStatus::Active
            },
        );
        let crawler = CrawlService::new(db_pool.clone(), registry, config.crawler_delay);

        Self {
            session_cache: SessionCache::new(db_pool.clone(), config.session_ttl),
            uploads: UploadStore::new(
                config.upload_dir.clone(),
                &config.upload_url_prefix,
                config.max_upload_bytes,
            ),
            kakao,
            crawler,
            service_statuses,
            db_pool,
            config: Arc::new(config),
        }
    }
}
