//! Application configuration loaded from the environment.

use fundu::{DurationParser, TimeUnit};
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration.
///
/// Every field maps to an upper-case environment variable of the same name
/// (`DATABASE_URL`, `SESSION_TTL`, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    pub database_url: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(
        default = "default_shutdown_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub shutdown_timeout: Duration,

    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_upload_url_prefix")]
    pub upload_url_prefix: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    #[serde(default = "default_session_ttl", deserialize_with = "deserialize_duration")]
    pub session_ttl: Duration,
    #[serde(default)]
    pub cookie_secure: bool,

    #[serde(
        default = "default_crawler_delay",
        deserialize_with = "deserialize_duration"
    )]
    pub crawler_delay: Duration,

    pub kakao_rest_api_key: Option<String>,
    #[serde(default = "default_kakao_api_base_url")]
    pub kakao_api_base_url: String,
    #[serde(default = "default_kakao_requests_per_second")]
    pub kakao_requests_per_second: u32,

    pub admin_email: Option<String>,
    pub admin_password: Option<String>,

    /// Comma-separated browser origins allowed to send credentials.
    pub cors_origins: Option<String>,
}

fn default_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(8)
}
fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}
fn default_upload_url_prefix() -> String {
    "/uploads".to_string()
}
fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}
fn default_session_ttl() -> Duration {
    Duration::from_secs(7 * 24 * 60 * 60)
}
fn default_crawler_delay() -> Duration {
    Duration::from_secs(2)
}
fn default_kakao_api_base_url() -> String {
    "https://dapi.kakao.com".to_string()
}
fn default_kakao_requests_per_second() -> u32 {
    5
}

/// Parse a human duration such as `"500ms"`, `"2s"`, `"7d"` or a bare number of seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let parser = DurationParser::with_time_units(&[
        TimeUnit::MilliSecond,
        TimeUnit::Second,
        TimeUnit::Minute,
        TimeUnit::Hour,
        TimeUnit::Day,
    ]);
    let parsed = parser
        .parse(input.trim())
        .map_err(|e| format!("invalid duration {input:?}: {e}"))?;
    Duration::try_from(parsed).map_err(|e| format!("invalid duration {input:?}: {e}"))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DurationInput {
    Seconds(u64),
    Text(String),
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match DurationInput::deserialize(deserializer)? {
        DurationInput::Seconds(secs) => Ok(Duration::from_secs(secs)),
        DurationInput::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

impl Config {
    /// Load configuration from raw environment variables.
    pub fn from_env() -> Result<Self, figment::Error> {
        use figment::{Figment, providers::Env};
        Figment::new().merge(Env::raw()).extract()
    }

    /// Whether Kakao Local API features are usable.
    pub fn kakao_enabled(&self) -> bool {
        self.kakao_rest_api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }

    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(|o| o.trim().trim_end_matches('/'))
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect()
    }
}
