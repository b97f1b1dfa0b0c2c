//! Kakao Local API client and restaurant reconciliation.

pub mod matching;
pub mod sync;

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Deserialize;
use tracing::debug;

pub use sync::{SyncReport, sync_restaurants};

#[derive(Debug, thiserror::Error)]
pub enum KakaoError {
    #[error("Kakao API key is not configured")]
    NotConfigured,
    #[error("Kakao request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Kakao API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

/// A place from the keyword search endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct KakaoPlace {
    pub id: String,
    pub place_name: String,
    #[serde(default)]
    pub category_name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address_name: String,
    #[serde(default)]
    pub road_address_name: String,
    /// Longitude, as a decimal string.
    #[serde(default)]
    pub x: String,
    /// Latitude, as a decimal string.
    #[serde(default)]
    pub y: String,
}

impl KakaoPlace {
    /// `(latitude, longitude)` when both parse.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.y.parse().ok()?, self.x.parse().ok()?))
    }
}

#[derive(Debug, Clone, Deserialize)]
struct AddressDocument {
    #[serde(default)]
    x: String,
    #[serde(default)]
    y: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse<T> {
    documents: Vec<T>,
}

pub struct KakaoClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    limiter: DefaultDirectRateLimiter,
}

impl KakaoClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        api_key: Option<String>,
        requests_per_second: u32,
    ) -> Self {
        let rate = NonZeroU32::new(requests_per_second.max(1)).unwrap_or(NonZeroU32::MIN);
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            limiter: RateLimiter::direct(Quota::per_second(rate)),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, KakaoError> {
        let key = self.api_key.as_deref().ok_or(KakaoError::NotConfigured)?;
        self.limiter.until_ready().await;

        let response = self
            .http
            .get(format!("{}{path}", self.base_url))
            .header("Authorization", format!("KakaoAK {key}"))
            .query(query)
            .timeout(Duration::from_secs(10))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(KakaoError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }
        let parsed: SearchResponse<T> = response.json().await?;
        debug!(path, results = parsed.documents.len(), "kakao search");
        Ok(parsed.documents)
    }

    /// Keyword search across all categories; some listings are not tagged as restaurants.
    pub async fn search_keyword(&self, query: &str) -> Result<Vec<KakaoPlace>, KakaoError> {
        self.get("/v2/local/search/keyword.json", &[("query", query), ("size", "15")])
            .await
    }

    /// Geocode an address to `(latitude, longitude)`.
    pub async fn geocode(&self, address: &str) -> Result<Option<(f64, f64)>, KakaoError> {
        let address = address.trim();
        if address.is_empty() {
            return Ok(None);
        }
        let docs: Vec<AddressDocument> = self
            .get("/v2/local/search/address.json", &[("query", address), ("size", "1")])
            .await?;
        Ok(docs
            .first()
            .and_then(|d| Some((d.y.parse().ok()?, d.x.parse().ok()?))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_place_deserializes_with_missing_fields() {
        let json = r#"{"documents":[{"id":"123","place_name":"을지면옥","x":"126.99","y":"37.56"}]}"#;
        let parsed: SearchResponse<KakaoPlace> = serde_json::from_str(json).unwrap();
        let place = &parsed.documents[0];
        assert_eq!(place.id, "123");
        assert_eq!(place.road_address_name, "");
        assert_eq!(place.coordinates(), Some((37.56, 126.99)));
    }

    #[test]
    fn test_unconfigured_client() {
        let client = KakaoClient::new(reqwest::Client::new(), "https://dapi.kakao.com/", Some("  ".into()), 0);
        assert!(!client.is_configured());
        assert_eq!(client.base_url, "https://dapi.kakao.com");
    }
}
