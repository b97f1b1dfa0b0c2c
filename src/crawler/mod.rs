//! Broadcast episode crawling.
//!
//! Each supported program has an [`EpisodeScraper`] adapter that turns an
//! episode page into a [`ScrapedEpisode`]. [`CrawlService`] walks an episode
//! range sequentially and persists what the adapters return.

pub mod service;
pub mod tasty_guys;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

use crate::data::models::Broadcast;

pub use service::{CrawlReport, CrawlService, CrawlStatus};

#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("unknown broadcast code: {0}")]
    UnknownBroadcast(String),
    #[error("no scraper registered for broadcast {0}")]
    NoScraper(String),
    #[error("invalid episode range {start}..={end}")]
    InvalidRange { start: i32, end: i32 },
    #[error("a crawl is already running")]
    AlreadyRunning,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("could not parse page: {0}")]
    Parse(String),
    #[error("requested episode {requested} but page shows episode {found}")]
    EpisodeMismatch { requested: i32, found: i32 },
    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

/// One restaurant mentioned on an episode page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedRestaurant {
    pub name: String,
    /// Empty when the page gave no address.
    pub address: String,
    pub menu: Option<String>,
    pub kakao_place_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedEpisode {
    pub episode_no: i32,
    pub title: Option<String>,
    pub air_date: Option<NaiveDate>,
    pub source_url: String,
    pub parser_ver: i16,
    pub restaurants: Vec<ScrapedRestaurant>,
}

#[async_trait]
pub trait EpisodeScraper: Send + Sync {
    /// Broadcast code this adapter handles, e.g. `TASTY_GUYS`.
    fn code(&self) -> &str;

    /// Highest episode number currently published.
    async fn latest_episode(&self) -> Result<i32, CrawlError>;

    async fn fetch_episode(&self, episode_no: i32) -> Result<ScrapedEpisode, CrawlError>;
}

/// Scraper adapters keyed by broadcast code.
#[derive(Clone, Default)]
pub struct ScraperRegistry {
    scrapers: HashMap<String, Arc<dyn EpisodeScraper>>,
}

impl ScraperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build adapters for every stored broadcast that has one.
    pub fn from_broadcasts(http: &reqwest::Client, broadcasts: &[Broadcast]) -> Self {
        let mut registry = Self::new();
        for broadcast in broadcasts {
            match broadcast.code.as_str() {
                tasty_guys::CODE => {
                    registry.register(Arc::new(tasty_guys::TastyGuysScraper::new(
                        http.clone(),
                        &broadcast.episode_url_template,
                        &broadcast.list_url,
                    )));
                }
                other => tracing::debug!(code = other, "no scraper adapter for broadcast"),
            }
        }
        registry
    }

    pub fn register(&mut self, scraper: Arc<dyn EpisodeScraper>) {
        self.scrapers.insert(scraper.code().to_string(), scraper);
    }

    pub fn get(&self, code: &str) -> Option<Arc<dyn EpisodeScraper>> {
        self.scrapers.get(code).cloned()
    }

    pub fn codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.scrapers.keys().cloned().collect();
        codes.sort();
        codes
    }
}
