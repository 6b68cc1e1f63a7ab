//! # Price Feed
//!
//! Fetches the latest USD price and 24 hour change for the configured coins
//! from CoinGecko's `simple/price` endpoint.
//!
//! ## Request
//! ```text
//! GET {base}/simple/price?ids=bitcoin,ethereum&vs_currencies=usd&include_24hr_change=true
//! ```
//!
//! ## Response
//! ```json
//! { "bitcoin": { "usd": 65000.5, "usd_24h_change": -2.3 } }
//! ```
//!
//! Ids the API does not know are simply absent from the body. Either field
//! may be missing for a known id; the display shows `N/A` in that case.
//!
//! ## Error Handling
//! Timeouts, HTTP status errors and undecodable bodies all surface as
//! [`FeedError`]. The controller does not tell them apart: one attempt per wake
//! cycle, and any failure is shown and followed by the scheduled sleep.

use chrono::{DateTime, Local};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while fetching prices.
#[derive(Error, Debug)]
pub enum FeedError {
    /// HTTP request failed (network, timeout, or non-success status)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Body was not the expected JSON shape
    #[error("decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    /// The async runtime could not be started
    #[error("runtime: {0}")]
    Runtime(#[from] io::Error),
}

/// Price data for one coin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Quote {
    #[serde(default)]
    pub usd: Option<f64>,
    #[serde(default)]
    pub usd_24h_change: Option<f64>,
}

/// All quotes from one fetch.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceSnapshot {
    pub quotes: HashMap<String, Quote>,
    pub fetched_at: DateTime<Local>,
}

impl PriceSnapshot {
    pub fn new(quotes: HashMap<String, Quote>, fetched_at: DateTime<Local>) -> Self {
        Self { quotes, fetched_at }
    }

    /// Decode a `simple/price` response body.
    pub fn from_json(body: &[u8], fetched_at: DateTime<Local>) -> Result<Self, FeedError> {
        let quotes: HashMap<String, Quote> = serde_json::from_slice(body)?;
        Ok(Self::new(quotes, fetched_at))
    }

    pub fn quote(&self, coin_id: &str) -> Option<&Quote> {
        self.quotes.get(coin_id)
    }
}

/// Source of price snapshots.
pub trait PriceFeed {
    fn fetch(&mut self, coin_ids: &[String]) -> Result<PriceSnapshot, FeedError>;
}

/// CoinGecko client. Owns a small tokio runtime so the blocking controller
/// can drive the async HTTP client with `block_on`.
pub struct CoinGeckoFeed {
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
    base_url: String,
}

impl CoinGeckoFeed {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            client,
            runtime,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Request URL for the given coins.
    pub fn price_url(&self, coin_ids: &[String]) -> String {
        price_url(&self.base_url, coin_ids)
    }

    async fn fetch_async(&self, url: &str) -> Result<PriceSnapshot, FeedError> {
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        debug!("price response: {} bytes", body.len());
        PriceSnapshot::from_json(&body, Local::now())
    }
}

impl PriceFeed for CoinGeckoFeed {
    fn fetch(&mut self, coin_ids: &[String]) -> Result<PriceSnapshot, FeedError> {
        let url = self.price_url(coin_ids);
        info!("Fetching prices for {}", coin_ids.join(", "));
        self.runtime.block_on(self.fetch_async(&url))
    }
}

/// Coin ids are URL-safe slugs, so they go into the query unescaped.
pub fn price_url(base_url: &str, coin_ids: &[String]) -> String {
    format!(
        "{}/simple/price?ids={}&vs_currencies=usd&include_24hr_change=true",
        base_url.trim_end_matches('/'),
        coin_ids.join(",")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_url() {
        let ids = vec!["bitcoin".to_string(), "avalanche-2".to_string()];
        assert_eq!(
            price_url("https://api.coingecko.com/api/v3/", &ids),
            "https://api.coingecko.com/api/v3/simple/price?ids=bitcoin,avalanche-2&vs_currencies=usd&include_24hr_change=true"
        );
    }

    #[test]
    fn test_decode_snapshot() {
        let body = br#"{"bitcoin":{"usd":65000.5,"usd_24h_change":-2.3},"sui":{"usd":1.25}}"#;
        let snapshot = PriceSnapshot::from_json(body, Local::now()).unwrap();

        let btc = snapshot.quote("bitcoin").unwrap();
        assert_eq!(btc.usd, Some(65000.5));
        assert_eq!(btc.usd_24h_change, Some(-2.3));

        let sui = snapshot.quote("sui").unwrap();
        assert_eq!(sui.usd_24h_change, None);
        assert!(snapshot.quote("ethereum").is_none());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let result = PriceSnapshot::from_json(b"<html>rate limited</html>", Local::now());
        assert!(matches!(result, Err(FeedError::Decode(_))));
    }

    #[test]
    fn test_client_builds() {
        let feed = CoinGeckoFeed::new("http://localhost:1", Duration::from_secs(1)).unwrap();
        assert_eq!(
            feed.price_url(&["tron".to_string()]),
            "http://localhost:1/simple/price?ids=tron&vs_currencies=usd&include_24hr_change=true"
        );
    }
}
