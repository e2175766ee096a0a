//! Client for the CORS-safe price proxy.
//!
//! The proxy mirrors the `simple/price` body for the configured token. When it
//! cannot reach upstream itself it still answers 200, with `_fallback: true`
//! and an `_error` string embedded in the token entry.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::error::SourceError;
use crate::models::price::PriceSource;
use crate::services::price_source::{parse_simple_price, HealthProbe, SimplePriceQuote, SpotPriceSource};

#[derive(Clone)]
pub struct PriceProxyClient {
    client: Client,
    /// Full URL of the proxy route, e.g. `https://app.example/api/price`.
    url: String,
}

impl PriceProxyClient {
    pub fn new(client: Client, url: String) -> Self {
        Self { client, url }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SpotPriceSource for PriceProxyClient {
    fn name(&self) -> &str {
        "proxy"
    }

    fn tier(&self) -> PriceSource {
        PriceSource::Proxy
    }

    async fn fetch_spot(&self, token_id: &str) -> Result<SimplePriceQuote, SourceError> {
        tracing::debug!("Fetching spot price for {} via proxy {}", token_id, self.url);

        let response = self
            .client
            .get(&self.url)
            .header("accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                body: error_text,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SourceError::Malformed(format!("invalid JSON from proxy: {}", e)))?;

        parse_simple_price(&body, token_id)
    }
}

#[async_trait]
impl HealthProbe for PriceProxyClient {
    fn name(&self) -> &str {
        "proxy-head"
    }

    async fn probe(&self) -> Result<u16, SourceError> {
        let response = self.client.head(&self.url).send().await?;
        Ok(response.status().as_u16())
    }
}
