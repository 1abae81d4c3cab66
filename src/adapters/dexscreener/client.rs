//! DexScreener API Client
//!
//! Public REST API, no key required. Rate limits are tight (roughly 300
//! requests per minute on the pair endpoints), so 429 and 5xx responses are
//! retried with backoff before giving up.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use thiserror::Error;

use super::types::{DexPair, DexPairsResponse};
use crate::config::loader::DexScreenerSection;
use crate::domain::{PairFilter, PairSnapshot};
use crate::ports::{FeedError, MarketFeed};

#[derive(Debug, Error)]
pub enum DexScreenerError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Unexpected status {0}")]
    Status(StatusCode),
    #[error("Rate limited")]
    RateLimited,
    #[error("Failed to parse response: {0}")]
    Parse(String),
}

impl From<DexScreenerError> for FeedError {
    fn from(err: DexScreenerError) -> Self {
        match err {
            DexScreenerError::RateLimited => FeedError::RateLimited,
            DexScreenerError::Parse(msg) => FeedError::Malformed(msg),
            other => FeedError::Request(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DexScreenerConfig {
    pub api_base_url: String,
    pub chain_id: String,
    /// Search terms used to discover pairs each scan
    pub search_queries: Vec<String>,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for DexScreenerConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.dexscreener.com".to_string(),
            chain_id: "solana".to_string(),
            search_queries: vec!["SOL".to_string(), "USDC".to_string()],
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }
}

impl From<&DexScreenerSection> for DexScreenerConfig {
    fn from(section: &DexScreenerSection) -> Self {
        Self {
            api_base_url: section.api_url.trim_end_matches('/').to_string(),
            chain_id: section.chain_id.clone(),
            search_queries: section.search_queries.clone(),
            timeout: Duration::from_secs(section.timeout_secs),
            max_retries: section.max_retries.max(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DexScreenerClient {
    config: DexScreenerConfig,
    http: Client,
}

impl DexScreenerClient {
    pub fn new(config: DexScreenerConfig) -> Result<Self, DexScreenerError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DexScreenerError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { config, http })
    }

    pub fn chain_id(&self) -> &str {
        &self.config.chain_id
    }

    /// `GET /latest/dex/search?q=`
    pub async fn search(&self, query: &str) -> Result<Vec<DexPair>, DexScreenerError> {
        let url = format!("{}/latest/dex/search", self.config.api_base_url);
        let body: DexPairsResponse = self.get_json(&url, &[("q", query)]).await?;
        Ok(self.on_chain(body.into_pairs()))
    }

    /// `GET /latest/dex/pairs/{chain}/{pair}`
    pub async fn pair(&self, pair_address: &str) -> Result<Option<DexPair>, DexScreenerError> {
        let url = format!(
            "{}/latest/dex/pairs/{}/{}",
            self.config.api_base_url, self.config.chain_id, pair_address
        );
        let body: DexPairsResponse = self.get_json(&url, &[]).await?;
        let mut pairs = body.into_pairs();
        let position = pairs.iter().position(|p| p.pair_address == pair_address);
        Ok(match position {
            Some(index) => Some(pairs.swap_remove(index)),
            None => pairs.into_iter().next(),
        })
    }

    /// `GET /latest/dex/tokens/{address}`
    pub async fn token_pairs(&self, token_address: &str) -> Result<Vec<DexPair>, DexScreenerError> {
        let url = format!("{}/latest/dex/tokens/{}", self.config.api_base_url, token_address);
        let body: DexPairsResponse = self.get_json(&url, &[]).await?;
        Ok(self.on_chain(body.into_pairs()))
    }

    fn on_chain(&self, pairs: Vec<DexPair>) -> Vec<DexPair> {
        pairs
            .into_iter()
            .filter(|p| p.chain_id.eq_ignore_ascii_case(&self.config.chain_id))
            .collect()
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, DexScreenerError> {
        let response = self.execute_with_retry(url, query).await?;
        response
            .json()
            .await
            .map_err(|e| DexScreenerError::Parse(e.to_string()))
    }

    /// 429 backs off exponentially, 5xx and transport errors linearly
    async fn execute_with_retry(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<reqwest::Response, DexScreenerError> {
        let mut last_error = None;

        for attempt in 0..self.config.max_retries {
            match self.http.get(url).query(query).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                    let backoff = Duration::from_secs(2u64.pow(attempt + 1));
                    tracing::warn!(
                        "DexScreener rate limited, backing off for {:?} (attempt {}/{})",
                        backoff,
                        attempt + 1,
                        self.config.max_retries
                    );
                    last_error = Some(DexScreenerError::RateLimited);
                    tokio::time::sleep(backoff).await;
                }
                Ok(response) if response.status().is_server_error() => {
                    last_error = Some(DexScreenerError::Status(response.status()));
                    tokio::time::sleep(Duration::from_millis(500 * (attempt as u64 + 1))).await;
                }
                Ok(response) => return Err(DexScreenerError::Status(response.status())),
                Err(e) => {
                    last_error = Some(DexScreenerError::Http(e.to_string()));
                    tokio::time::sleep(Duration::from_millis(500 * (attempt as u64 + 1))).await;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| DexScreenerError::Http("Max retries exceeded".into())))
    }
}

#[async_trait]
impl MarketFeed for DexScreenerClient {
    async fn get_pairs(&self, filter: &PairFilter) -> Result<Vec<PairSnapshot>, FeedError> {
        let mut collected = Vec::new();
        let mut failures = 0;
        let mut last_error = None;

        for query in &self.config.search_queries {
            match self.search(query).await {
                Ok(pairs) => collected.extend(pairs),
                Err(e) => {
                    tracing::warn!("DexScreener search '{}' failed: {}", query, e);
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }

        // One failed query is tolerated; all of them failing is a feed error.
        if failures > 0 && failures == self.config.search_queries.len() {
            if let Some(e) = last_error {
                return Err(e.into());
            }
        }

        let snapshots = collected
            .iter()
            .filter(|p| filter.accepts_quote(&p.quote_token.symbol))
            .filter_map(DexPair::to_snapshot);
        Ok(dedupe_by_token(snapshots))
    }

    async fn get_price(&self, pair_address: &str) -> Result<Option<Decimal>, FeedError> {
        Ok(self.pair(pair_address).await?.and_then(|p| p.price()))
    }

    async fn get_token_pairs(&self, token_address: &str) -> Result<Vec<PairSnapshot>, FeedError> {
        let pairs = self.token_pairs(token_address).await?;
        Ok(pairs
            .iter()
            .filter(|p| p.base_token.address == token_address)
            .filter_map(DexPair::to_snapshot)
            .collect())
    }

    async fn search_symbol(&self, symbol: &str) -> Result<Vec<PairSnapshot>, FeedError> {
        let pairs = self.search(symbol).await?;
        Ok(pairs
            .iter()
            .filter(|p| p.base_token.symbol.eq_ignore_ascii_case(symbol))
            .filter_map(DexPair::to_snapshot)
            .collect())
    }
}

/// One snapshot per token, keeping the pair with the highest 5m volume.
/// Output order follows first appearance.
pub fn dedupe_by_token(snapshots: impl IntoIterator<Item = PairSnapshot>) -> Vec<PairSnapshot> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<PairSnapshot> = Vec::new();

    for snap in snapshots {
        match index.get(&snap.token_address) {
            Some(&i) => {
                if snap.volume_5m_usd > out[i].volume_5m_usd {
                    out[i] = snap;
                }
            }
            None => {
                index.insert(snap.token_address.clone(), out.len());
                out.push(snap);
            }
        }
    }
    out
}
