//! Jupiter API Client
//!
//! HTTP client for the Jupiter swap API (v1). Fetches quotes and builds
//! unsigned swap transactions; signing and sending live in the executor.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

use super::quote::{QuoteRequest, QuoteResponse};
use super::swap::{SwapTxRequest, SwapTxResponse};
use crate::config::loader::JupiterSection;

#[derive(Debug, Error)]
pub enum JupiterError {
    #[error("Jupiter API error: {0}")]
    Api(String),
    #[error("No route: {0}")]
    NoRoute(String),
    #[error("Rate limit exceeded")]
    RateLimited,
    #[error("Slippage tolerance exceeded")]
    SlippageExceeded,
    #[error("Failed to parse response: {0}")]
    Parse(String),
}

/// Jupiter API client configuration
#[derive(Debug, Clone)]
pub struct JupiterConfig {
    pub api_base_url: String,
    /// Optional API key for higher rate limits
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for JupiterConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.jup.ag/swap/v1".to_string(),
            api_key: None,
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }
}

impl From<&JupiterSection> for JupiterConfig {
    fn from(section: &JupiterSection) -> Self {
        Self {
            api_base_url: section.api_url.trim_end_matches('/').to_string(),
            api_key: section.api_key.clone().filter(|k| !k.is_empty()),
            timeout: Duration::from_secs(section.timeout_secs),
            max_retries: section.max_retries.max(1),
        }
    }
}

/// Jupiter DEX aggregator client
#[derive(Debug, Clone)]
pub struct JupiterClient {
    config: JupiterConfig,
    http: Client,
}

impl JupiterClient {
    pub fn with_config(config: JupiterConfig) -> Result<Self, JupiterError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| JupiterError::Api(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, http })
    }

    pub async fn get_quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, JupiterError> {
        let url = format!("{}/quote", self.config.api_base_url);

        let mut req = self.http.get(&url).query(&[
            ("inputMint", request.input_mint.as_str()),
            ("outputMint", request.output_mint.as_str()),
            ("amount", &request.amount.to_string()),
            ("slippageBps", &request.slippage_bps.to_string()),
        ]);
        if request.only_direct_routes {
            req = req.query(&[("onlyDirectRoutes", "true")]);
        }

        let response = self.execute_with_retry(self.authorized(req)).await?;
        self.handle_response(response).await
    }

    /// Build the unsigned swap transaction for a quote
    pub async fn get_swap_transaction(&self, request: &SwapTxRequest) -> Result<SwapTxResponse, JupiterError> {
        let url = format!("{}/swap", self.config.api_base_url);
        let req = self.http.post(&url).json(request);

        let response = self.execute_with_retry(self.authorized(req)).await?;
        self.handle_response(response).await
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match self.config.api_key {
            Some(ref api_key) => req.header("x-api-key", api_key),
            None => req,
        }
    }

    /// Execute request with retry logic and rate limit handling
    async fn execute_with_retry(&self, req: RequestBuilder) -> Result<reqwest::Response, JupiterError> {
        let mut last_error = None;

        for attempt in 0..self.config.max_retries {
            let attempt_req = req
                .try_clone()
                .ok_or_else(|| JupiterError::Api("Failed to clone request".into()))?;

            match attempt_req.send().await {
                Ok(response) => {
                    if response.status().is_success() || response.status() == StatusCode::BAD_REQUEST {
                        return Ok(response);
                    }

                    // Handle rate limiting (429) with exponential backoff
                    if response.status() == StatusCode::TOO_MANY_REQUESTS {
                        let backoff = Duration::from_secs(2u64.pow(attempt + 1)); // 2s, 4s, 8s
                        tracing::warn!(
                            "Rate limited (429), backing off for {:?} (attempt {}/{})",
                            backoff, attempt + 1, self.config.max_retries
                        );
                        last_error = Some(JupiterError::RateLimited);
                        tokio::time::sleep(backoff).await;
                        continue;
                    }

                    // Retry on server errors (5xx)
                    if response.status().is_server_error() {
                        last_error = Some(JupiterError::Api(format!("Server error: {}", response.status())));
                        tokio::time::sleep(Duration::from_millis(500 * (attempt as u64 + 1))).await;
                        continue;
                    }

                    return Ok(response);
                }
                Err(e) => {
                    last_error = Some(JupiterError::Api(e.to_string()));
                    tokio::time::sleep(Duration::from_millis(500 * (attempt as u64 + 1))).await;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| JupiterError::Api("Max retries exceeded".into())))
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T, JupiterError> {
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(JupiterError::RateLimited);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_error(status, &error_text));
        }

        response
            .json()
            .await
            .map_err(|e| JupiterError::Parse(e.to_string()))
    }
}

/// Map an error body to the most specific variant
fn classify_error(status: StatusCode, body: &str) -> JupiterError {
    if body.contains("SlippageToleranceExceeded") || body.contains("6001") {
        return JupiterError::SlippageExceeded;
    }
    if body.contains("COULD_NOT_FIND_ANY_ROUTE")
        || body.contains("NO_ROUTES_FOUND")
        || body.contains("TOKEN_NOT_TRADABLE")
    {
        return JupiterError::NoRoute(body.to_string());
    }
    JupiterError::Api(format!("API error {}: {}", status, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jupiter_config_default() {
        let config = JupiterConfig::default();
        assert_eq!(config.api_base_url, "https://api.jup.ag/swap/v1");
        assert!(config.api_key.is_none());
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_config_from_section_drops_empty_key() {
        let section = JupiterSection {
            api_key: Some(String::new()),
            max_retries: 0,
            ..JupiterSection::default()
        };
        let config = JupiterConfig::from(&section);
        assert!(config.api_key.is_none());
        assert_eq!(config.max_retries, 1);
    }

    #[test]
    fn test_jupiter_client_creation() {
        assert!(JupiterClient::with_config(JupiterConfig::default()).is_ok());
    }

    #[test]
    fn test_classify_error() {
        assert!(matches!(
            classify_error(StatusCode::BAD_REQUEST, r#"{"error":"custom program error: 0x1771 6001"}"#),
            JupiterError::SlippageExceeded
        ));
        assert!(matches!(
            classify_error(StatusCode::BAD_REQUEST, r#"{"errorCode":"COULD_NOT_FIND_ANY_ROUTE"}"#),
            JupiterError::NoRoute(_)
        ));
        assert!(matches!(
            classify_error(StatusCode::FORBIDDEN, "nope"),
            JupiterError::Api(_)
        ));
    }
}
