//! Runtime configuration, read from the environment (and `.env` via dotenvy).

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::models::price::{Granularity, Period};

/// How a chart period maps onto the market-chart query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodSpec {
    pub days: u32,
    pub granularity: Granularity,
}

impl PeriodSpec {
    pub const fn new(days: u32, granularity: Granularity) -> Self {
        Self { days, granularity }
    }
}

/// Period -> (days, granularity). One field per period so a lookup can't miss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodTable {
    pub one_hour: PeriodSpec,
    pub one_day: PeriodSpec,
    pub seven_days: PeriodSpec,
    pub thirty_days: PeriodSpec,
    pub ninety_days: PeriodSpec,
    pub one_year: PeriodSpec,
}

impl Default for PeriodTable {
    fn default() -> Self {
        Self {
            one_hour: PeriodSpec::new(1, Granularity::Hourly),
            one_day: PeriodSpec::new(1, Granularity::Hourly),
            seven_days: PeriodSpec::new(7, Granularity::Daily),
            thirty_days: PeriodSpec::new(30, Granularity::Daily),
            ninety_days: PeriodSpec::new(90, Granularity::Daily),
            one_year: PeriodSpec::new(365, Granularity::Daily),
        }
    }
}

impl PeriodTable {
    pub fn get(&self, period: Period) -> PeriodSpec {
        match period {
            Period::OneHour => self.one_hour,
            Period::OneDay => self.one_day,
            Period::SevenDays => self.seven_days,
            Period::ThirtyDays => self.thirty_days,
            Period::NinetyDays => self.ninety_days,
            Period::OneYear => self.one_year,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub provider_base_url: String,
    pub provider_api_key: Option<String>,
    /// Proxy route; the proxy tier is skipped when unset.
    pub proxy_url: Option<String>,
    pub token_id: String,
    pub fallback_price: f64,
    pub cache_ttl: Duration,
    pub refresh_interval: Duration,
    pub fetch_timeout: Duration,
    pub health_timeout: Duration,
    pub health_latency_threshold: Duration,
    pub health_check_interval: Duration,
    pub refresh_debounce: Duration,
    pub alert_display: Duration,
    /// Minimum move, in percent, that raises a price alert.
    pub alert_threshold_pct: f64,
    pub periods: PeriodTable,
    pub bind_addr: String,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider_base_url: "https://api.coingecko.com/api/v3".to_string(),
            provider_api_key: None,
            proxy_url: None,
            token_id: "gooddollar".to_string(),
            fallback_price: 0.0001,
            cache_ttl: Duration::from_secs(300),
            refresh_interval: Duration::from_secs(300),
            fetch_timeout: Duration::from_secs(10),
            health_timeout: Duration::from_secs(5),
            health_latency_threshold: Duration::from_millis(3000),
            health_check_interval: Duration::from_secs(60),
            refresh_debounce: Duration::from_millis(300),
            alert_display: Duration::from_secs(5),
            alert_threshold_pct: 5.0,
            periods: PeriodTable::default(),
            bind_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

impl OracleConfig {
    /// Load from process environment. Call `dotenvy::dotenv()` first to pick up `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let fallback_price: f64 = parse_or(&lookup, "FALLBACK_PRICE", defaults.fallback_price)?;
        if !fallback_price.is_finite() || fallback_price < 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "FALLBACK_PRICE".to_string(),
                value: fallback_price.to_string(),
            });
        }

        Ok(Self {
            provider_base_url: text("COINGECKO_BASE_URL").unwrap_or(defaults.provider_base_url),
            provider_api_key: text("COINGECKO_API_KEY"),
            proxy_url: text("PRICE_PROXY_URL"),
            token_id: text("TOKEN_ID").unwrap_or(defaults.token_id),
            fallback_price,
            cache_ttl: secs_or(&lookup, "CACHE_TTL_SECS", defaults.cache_ttl)?,
            refresh_interval: nonzero_secs_or(&lookup, "PRICE_REFRESH_INTERVAL_SECS", defaults.refresh_interval)?,
            fetch_timeout: secs_or(&lookup, "FETCH_TIMEOUT_SECS", defaults.fetch_timeout)?,
            health_timeout: secs_or(&lookup, "HEALTH_TIMEOUT_SECS", defaults.health_timeout)?,
            health_latency_threshold: millis_or(
                &lookup,
                "HEALTH_LATENCY_THRESHOLD_MS",
                defaults.health_latency_threshold,
            )?,
            health_check_interval: nonzero_secs_or(
                &lookup,
                "HEALTH_CHECK_INTERVAL_SECS",
                defaults.health_check_interval,
            )?,
            refresh_debounce: millis_or(&lookup, "REFRESH_DEBOUNCE_MS", defaults.refresh_debounce)?,
            alert_display: secs_or(&lookup, "ALERT_DISPLAY_SECS", defaults.alert_display)?,
            alert_threshold_pct: parse_or(&lookup, "PRICE_ALERT_THRESHOLD_PCT", defaults.alert_threshold_pct)?,
            periods: defaults.periods,
            bind_addr: text("BIND_ADDR").unwrap_or(defaults.bind_addr),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        }),
    }
}

fn secs_or<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, key, default.as_secs()).map(Duration::from_secs)
}

/// Like `secs_or`, for periods that drive a ticker and so cannot be zero.
fn nonzero_secs_or<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let period = secs_or(lookup, key, default)?;
    if period.is_zero() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: "0".to_string(),
        });
    }
    Ok(period)
}

fn millis_or<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, key, default.as_millis() as u64).map(Duration::from_millis)
}
