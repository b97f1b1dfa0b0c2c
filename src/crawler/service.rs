//! Sequential episode-range crawl with per-episode failure isolation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};
use ts_rs::TS;

use super::{CrawlError, EpisodeScraper, ScraperRegistry};
use crate::data::broadcasts::{self, PersistOutcome};
use crate::utils::fmt_duration;

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CrawlFailure {
    pub episode: i32,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CrawlReport {
    pub broadcast_code: String,
    pub start: i32,
    pub end: i32,
    pub success: u32,
    pub skipped: u32,
    pub failed: Vec<CrawlFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl CrawlReport {
    fn new(broadcast_code: &str, start: i32, end: i32) -> Self {
        Self {
            broadcast_code: broadcast_code.to_string(),
            start,
            end,
            success: 0,
            skipped: 0,
            failed: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// Snapshot for `GET /crawler/status`.
#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CrawlStatus {
    pub running: bool,
    /// Episode currently being processed.
    pub current_episode: Option<i32>,
    /// Progress of the running crawl, or the outcome of the last one.
    pub report: Option<CrawlReport>,
    pub broadcasts: Vec<String>,
}

/// Clears the running flag however the crawl ends.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Default)]
struct Progress {
    current_episode: Option<i32>,
    report: Option<CrawlReport>,
}

pub struct CrawlService {
    pool: PgPool,
    registry: ScraperRegistry,
    delay: Duration,
    running: AtomicBool,
    progress: RwLock<Progress>,
}

impl CrawlService {
    pub fn new(pool: PgPool, registry: ScraperRegistry, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            pool,
            registry,
            delay,
            running: AtomicBool::new(false),
            progress: RwLock::new(Progress::default()),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub async fn status(&self) -> CrawlStatus {
        let progress = self.progress.read().await;
        CrawlStatus {
            running: self.is_running(),
            current_episode: progress.current_episode,
            report: progress.report.clone(),
            broadcasts: self.registry.codes(),
        }
    }

    /// Crawl episodes `start..=end` of a broadcast. `end` defaults to the latest episode.
    ///
    /// Stored episodes are skipped without fetching. A failing episode is
    /// recorded in the report and the loop moves on.
    #[instrument(skip(self))]
    pub async fn crawl(&self, code: &str, start: i32, end: Option<i32>) -> Result<CrawlReport, CrawlError> {
        // Reject bad bounds before asking the source site for its latest episode.
        if start < 1 || end.is_some_and(|end| start > end) {
            return Err(CrawlError::InvalidRange {
                start,
                end: end.unwrap_or(start),
            });
        }
        let _guard = RunGuard::acquire(&self.running).ok_or(CrawlError::AlreadyRunning)?;

        let broadcast = broadcasts::get_by_code(&self.pool, code)
            .await?
            .ok_or_else(|| CrawlError::UnknownBroadcast(code.to_string()))?;
        let scraper = self
            .registry
            .get(&broadcast.code)
            .ok_or_else(|| CrawlError::NoScraper(broadcast.code.clone()))?;

        let end = match end {
            Some(end) => end,
            None => scraper.latest_episode().await?,
        };
        if start > end {
            return Err(CrawlError::InvalidRange { start, end });
        }

        info!(start, end, "crawl started");
        let started = Instant::now();
        {
            let mut progress = self.progress.write().await;
            progress.current_episode = None;
            progress.report = Some(CrawlReport::new(&broadcast.code, start, end));
        }

        let mut fetched_any = false;
        for episode_no in start..=end {
            self.progress.write().await.current_episode = Some(episode_no);

            let result = match broadcasts::episode_exists(&self.pool, broadcast.id, episode_no).await {
                Ok(true) => Ok(EpisodeResult::Skipped),
                Ok(false) => {
                    if fetched_any {
                        tokio::time::sleep(self.delay).await;
                    }
                    fetched_any = true;
                    self.crawl_episode(scraper.as_ref(), broadcast.id, episode_no).await
                }
                Err(e) => Err(CrawlError::Database(e)),
            };

            let mut progress = self.progress.write().await;
            let Some(report) = progress.report.as_mut() else {
                continue;
            };
            match result {
                Ok(EpisodeResult::Stored) => report.success += 1,
                Ok(EpisodeResult::Skipped) => report.skipped += 1,
                Err(e) => {
                    warn!(episode_no, error = %e, "episode failed");
                    report.failed.push(CrawlFailure {
                        episode: episode_no,
                        error: e.to_string(),
                    });
                }
            }
        }

        let mut progress = self.progress.write().await;
        progress.current_episode = None;
        let mut report = progress
            .report
            .clone()
            .unwrap_or_else(|| CrawlReport::new(&broadcast.code, start, end));
        report.finished_at = Some(Utc::now());
        progress.report = Some(report.clone());

        info!(
            success = report.success,
            skipped = report.skipped,
            failed = report.failed.len(),
            duration = fmt_duration(started.elapsed()),
            "crawl finished"
        );
        Ok(report)
    }

    async fn crawl_episode(
        &self,
        scraper: &dyn EpisodeScraper,
        broadcast_id: i32,
        episode_no: i32,
    ) -> Result<EpisodeResult, CrawlError> {
        let episode = scraper.fetch_episode(episode_no).await?;
        match broadcasts::persist_episode(&self.pool, broadcast_id, &episode).await? {
            PersistOutcome::Stored {
                restaurants_linked,
                restaurants_created,
                ..
            } => {
                info!(
                    episode_no,
                    restaurants_linked, restaurants_created, "episode stored"
                );
                Ok(EpisodeResult::Stored)
            }
            PersistOutcome::AlreadyExists => Ok(EpisodeResult::Skipped),
        }
    }
}

enum EpisodeResult {
    Stored,
    Skipped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_guard_is_exclusive_and_released() {
        let flag = AtomicBool::new(false);
        {
            let guard = RunGuard::acquire(&flag);
            assert!(guard.is_some());
            assert!(RunGuard::acquire(&flag).is_none());
        }
        assert!(!flag.load(Ordering::Acquire));
        assert!(RunGuard::acquire(&flag).is_some());
    }
}
