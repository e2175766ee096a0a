use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PeriodParseError;

/// Which tier produced a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Proxy,
    Upstream,
    /// The proxy reported that it is serving its own fallback value.
    ProxyFallback,
    /// Synthesized locally after every tier failed.
    Fallback,
}

/// Auxiliary fields that were missing upstream and filled with `0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultedFields {
    pub change_24h: bool,
    pub market_cap: bool,
    pub volume_24h: bool,
}

impl DefaultedFields {
    pub fn all() -> Self {
        Self {
            change_24h: true,
            market_cap: true,
            volume_24h: true,
        }
    }

    pub fn any(&self) -> bool {
        self.change_24h || self.market_cap || self.volume_24h
    }
}

/// Spot value of the token in USD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    pub usd: f64,
    pub observed_at_millis: i64,
    pub change_24h_pct: f64,
    pub market_cap_usd: f64,
    pub volume_24h_usd: f64,
    pub source: PriceSource,
    pub defaulted: DefaultedFields,
    /// Why this is not live data. Set iff `is_fallback()`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

impl PricePoint {
    pub fn fallback(usd: f64, observed_at_millis: i64, reason: String) -> Self {
        Self {
            usd,
            observed_at_millis,
            change_24h_pct: 0.0,
            market_cap_usd: 0.0,
            volume_24h_usd: 0.0,
            source: PriceSource::Fallback,
            defaulted: DefaultedFields::all(),
            fallback_reason: Some(reason),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.source, PriceSource::Fallback | PriceSource::ProxyFallback)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPoint {
    pub timestamp_millis: i64,
    pub price: f64,
    pub volume_usd: f64,
}

/// Chart window requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "24h")]
    OneDay,
    #[serde(rename = "7d")]
    SevenDays,
    #[serde(rename = "30d")]
    ThirtyDays,
    #[serde(rename = "90d")]
    NinetyDays,
    #[serde(rename = "1y")]
    OneYear,
}

impl Period {
    pub const ALL: [Period; 6] = [
        Period::OneHour,
        Period::OneDay,
        Period::SevenDays,
        Period::ThirtyDays,
        Period::NinetyDays,
        Period::OneYear,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::OneHour => "1h",
            Period::OneDay => "24h",
            Period::SevenDays => "7d",
            Period::ThirtyDays => "30d",
            Period::NinetyDays => "90d",
            Period::OneYear => "1y",
        }
    }

    /// Cache key of the series for this period.
    pub fn cache_key(&self) -> String {
        format!("historical-{}", self.as_str())
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = PeriodParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Period::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| PeriodParseError(s.to_string()))
    }
}

/// `interval` parameter of the market-chart endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hourly,
    Daily,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Hourly => "hourly",
            Granularity::Daily => "daily",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSeries {
    pub points: Vec<HistoryPoint>,
    pub period: Period,
    pub currency: String,
    pub is_fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    pub token_amount: f64,
    pub fiat_amount: f64,
    pub rate: f64,
    pub rate_observed_at_millis: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertDirection {
    Increase,
    Decrease,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceAlert {
    pub direction: AlertDirection,
    pub old_price: f64,
    pub new_price: f64,
    pub change_pct: f64,
}
