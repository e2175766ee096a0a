use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::error::SourceError;
use crate::models::price::{Granularity, PriceSource};
use crate::services::price_source::{
    parse_market_chart, parse_simple_price, HealthProbe, HistorySource, MarketChart,
    SimplePriceQuote, SpotPriceSource,
};

/// Build the shared reqwest client used by every tier.
pub fn build_http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder().timeout(timeout).build()
}

/// Direct client for the CoinGecko-compatible upstream API.
#[derive(Clone)]
pub struct CoinGeckoService {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl CoinGeckoService {
    pub fn new(client: Client, base_url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(url).header("accept", "application/json");
        match &self.api_key {
            Some(key) => request.header("x-cg-pro-api-key", key),
            None => request,
        }
    }

    async fn get_json(&self, request: reqwest::RequestBuilder) -> Result<Value, SourceError> {
        let response = request.send().await?;

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
            .map_err(|e| SourceError::Malformed(format!("invalid JSON: {}", e)))?;
        Ok(body)
    }
}

#[async_trait]
impl SpotPriceSource for CoinGeckoService {
    fn name(&self) -> &str {
        "coingecko"
    }

    fn tier(&self) -> PriceSource {
        PriceSource::Upstream
    }

    async fn fetch_spot(&self, token_id: &str) -> Result<SimplePriceQuote, SourceError> {
        tracing::info!("Fetching spot price for {} from CoinGecko", token_id);

        let url = format!("{}/simple/price", self.base_url);
        let request = self.get(&url).query(&[
            ("ids", token_id),
            ("vs_currencies", "usd"),
            ("include_24hr_change", "true"),
            ("include_market_cap", "true"),
            ("include_24hr_vol", "true"),
        ]);

        let body = self.get_json(request).await?;
        parse_simple_price(&body, token_id)
    }
}

#[async_trait]
impl HistorySource for CoinGeckoService {
    async fn fetch_market_chart(
        &self,
        token_id: &str,
        days: u32,
        granularity: Granularity,
    ) -> Result<MarketChart, SourceError> {
        tracing::info!(
            "Fetching {}-day {} market chart for {} from CoinGecko",
            days,
            granularity.as_str(),
            token_id
        );

        let url = format!("{}/coins/{}/market_chart", self.base_url, token_id);
        let days = days.to_string();
        let request = self.get(&url).query(&[
            ("vs_currency", "usd"),
            ("days", days.as_str()),
            ("interval", granularity.as_str()),
        ]);

        let body = self.get_json(request).await?;
        let chart = parse_market_chart(&body)?;

        tracing::debug!(
            "Fetched {} prices and {} volumes for {}",
            chart.prices.len(),
            chart.total_volumes.len(),
            token_id
        );

        Ok(chart)
    }
}

#[async_trait]
impl HealthProbe for CoinGeckoService {
    fn name(&self) -> &str {
        "coingecko-ping"
    }

    async fn probe(&self) -> Result<u16, SourceError> {
        let url = format!("{}/ping", self.base_url);
        let response = self.get(&url).send().await?;
        Ok(response.status().as_u16())
    }
}
