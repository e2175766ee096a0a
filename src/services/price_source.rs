//! Network-facing seams of the oracle.
//!
//! The oracle only talks to these traits; the concrete HTTP clients live in
//! `coingecko` and `price_proxy`. Tests plug in scripted sources.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SourceError;
use crate::models::price::{Granularity, PriceSource};

/// One token's entry of a `simple/price` body, as sent on the wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimplePriceQuote {
    pub usd: f64,
    pub usd_24h_change: Option<f64>,
    pub usd_market_cap: Option<f64>,
    pub usd_24h_vol: Option<f64>,
    /// `_fallback` marker set by the proxy when it could not reach upstream.
    pub proxy_fallback: bool,
    pub proxy_error: Option<String>,
}

/// Raw `coins/{id}/market_chart` body: parallel `[timestamp, value]` series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketChart {
    pub prices: Vec<(i64, f64)>,
    pub total_volumes: Vec<(i64, f64)>,
}

/// A tier that can quote the token's spot price.
#[async_trait]
pub trait SpotPriceSource: Send + Sync {
    fn name(&self) -> &str;

    /// Tier recorded on prices this source produces.
    fn tier(&self) -> PriceSource;

    async fn fetch_spot(&self, token_id: &str) -> Result<SimplePriceQuote, SourceError>;
}

#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn fetch_market_chart(
        &self,
        token_id: &str,
        days: u32,
        granularity: Granularity,
    ) -> Result<MarketChart, SourceError>;
}

/// Liveness probe used by the health monitor.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    fn name(&self) -> &str;

    /// HTTP status of the probe. `Err` only when no response arrived.
    async fn probe(&self) -> Result<u16, SourceError>;
}

/// Pull `token_id`'s quote out of a `simple/price` shaped body.
pub fn parse_simple_price(body: &Value, token_id: &str) -> Result<SimplePriceQuote, SourceError> {
    let entry = body
        .get(token_id)
        .and_then(Value::as_object)
        .ok_or_else(|| SourceError::Malformed(format!("token '{}' missing from response", token_id)))?;

    let usd = entry
        .get("usd")
        .and_then(Value::as_f64)
        .ok_or_else(|| SourceError::Malformed(format!("no usd price for '{}'", token_id)))?;

    if !usd.is_finite() || usd < 0.0 {
        return Err(SourceError::Malformed(format!("invalid usd price {}", usd)));
    }

    let optional = |field: &str| entry.get(field).and_then(Value::as_f64).filter(|v| v.is_finite());

    Ok(SimplePriceQuote {
        usd,
        usd_24h_change: optional("usd_24h_change"),
        usd_market_cap: optional("usd_market_cap"),
        usd_24h_vol: optional("usd_24h_vol"),
        proxy_fallback: entry.get("_fallback").and_then(Value::as_bool).unwrap_or(false),
        proxy_error: entry.get("_error").and_then(Value::as_str).map(str::to_string),
    })
}

/// Parse a market-chart body. `prices` must be an array of `[ts, price]` pairs;
/// `total_volumes` is optional.
pub fn parse_market_chart(body: &Value) -> Result<MarketChart, SourceError> {
    let prices = body
        .get("prices")
        .and_then(Value::as_array)
        .ok_or_else(|| SourceError::Malformed("prices missing or not an array".to_string()))?;

    let prices = parse_pairs(prices, "prices")?;

    let total_volumes = match body.get("total_volumes").and_then(Value::as_array) {
        Some(volumes) => parse_pairs(volumes, "total_volumes")?,
        None => Vec::new(),
    };

    Ok(MarketChart { prices, total_volumes })
}

fn parse_pairs(items: &[Value], field: &str) -> Result<Vec<(i64, f64)>, SourceError> {
    items
        .iter()
        .map(|item| {
            let pair = item.as_array().filter(|pair| pair.len() >= 2);
            match pair.and_then(|pair| Some((pair[0].as_f64()?, pair[1].as_f64()?))) {
                Some((ts, value)) => Ok((ts as i64, value)),
                None => Err(SourceError::Malformed(format!("{} entry is not a [timestamp, value] pair", field))),
            }
        })
        .collect()
}
