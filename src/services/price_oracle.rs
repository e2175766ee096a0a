//! Price Oracle Service
//!
//! Spot price: cache -> each configured spot source in order (proxy, then
//! direct upstream) -> synthesized fallback. Historical series: cache ->
//! market-chart endpoint -> synthesized fallback series.
//!
//! Network failures never reach the caller. Every public read returns a usable
//! value, and fallback data is always marked as such.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{OracleConfig, PeriodTable};
use crate::error::{ConversionError, SourceError};
use crate::models::price::{
    ConversionResult, DefaultedFields, HistoryPoint, Period, PricePoint, PriceSeries, PriceSource,
};
use crate::services::cache_store::{CacheStore, CachedValue, CURRENT_PRICE_KEY};
use crate::services::clock::{Clock, SystemClock};
use crate::services::coingecko::{build_http_client, CoinGeckoService};
use crate::services::conversion;
use crate::services::failure_ledger::FailureLedger;
use crate::services::price_proxy::PriceProxyClient;
use crate::services::price_source::{HistorySource, MarketChart, SimplePriceQuote, SpotPriceSource};

const DAY_MILLIS: i64 = 86_400_000;

/// Static knobs of the oracle.
#[derive(Debug, Clone)]
pub struct OracleSettings {
    pub token_id: String,
    pub fallback_price: f64,
    /// Budget for each individual network attempt.
    pub fetch_timeout: Duration,
    pub periods: PeriodTable,
}

impl From<&OracleConfig> for OracleSettings {
    fn from(config: &OracleConfig) -> Self {
        Self {
            token_id: config.token_id.clone(),
            fallback_price: config.fallback_price,
            fetch_timeout: config.fetch_timeout,
            periods: config.periods.clone(),
        }
    }
}

pub struct PriceOracle {
    settings: OracleSettings,
    /// Tried in order until one answers.
    spot_sources: Vec<Arc<dyn SpotPriceSource>>,
    history_source: Arc<dyn HistorySource>,
    cache: Arc<CacheStore>,
    failures: Arc<FailureLedger>,
    clock: Arc<dyn Clock>,
}

impl PriceOracle {
    pub fn new(
        settings: OracleSettings,
        spot_sources: Vec<Arc<dyn SpotPriceSource>>,
        history_source: Arc<dyn HistorySource>,
        cache: Arc<CacheStore>,
        failures: Arc<FailureLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            spot_sources,
            history_source,
            cache,
            failures,
            clock,
        }
    }

    /// Wire the real proxy and CoinGecko clients from configuration.
    pub fn from_config(config: &OracleConfig) -> Result<Self, reqwest::Error> {
        let client = build_http_client(config.fetch_timeout)?;
        let coingecko = Arc::new(CoinGeckoService::new(
            client.clone(),
            config.provider_base_url.clone(),
            config.provider_api_key.clone(),
        ));

        let mut spot_sources: Vec<Arc<dyn SpotPriceSource>> = Vec::new();
        if let Some(proxy_url) = &config.proxy_url {
            spot_sources.push(Arc::new(PriceProxyClient::new(client, proxy_url.clone())));
        }
        spot_sources.push(coingecko.clone());

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let cache = Arc::new(CacheStore::new(config.cache_ttl, clock.clone()));

        Ok(Self::new(
            OracleSettings::from(config),
            spot_sources,
            coingecko,
            cache,
            Arc::new(FailureLedger::new()),
            clock,
        ))
    }

    pub fn settings(&self) -> &OracleSettings {
        &self.settings
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Names of the spot tiers in the order they are tried.
    pub fn spot_source_names(&self) -> Vec<String> {
        self.spot_sources.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn failure_count(&self, key: &str) -> u32 {
        self.failures.count(key)
    }

    /// Current spot price. Never fails; see module docs for the tier order.
    pub async fn get_current_price(&self) -> PricePoint {
        if let Some(cached) = self.cache.get_price(CURRENT_PRICE_KEY) {
            debug!("Cache hit for {}", CURRENT_PRICE_KEY);
            return cached;
        }

        let token_id = self.settings.token_id.as_str();
        let mut last_error: Option<String> = None;

        for source in &self.spot_sources {
            match self.attempt(source.fetch_spot(token_id)).await {
                Ok(quote) if quote.proxy_fallback => {
                    let reason = quote
                        .proxy_error
                        .clone()
                        .unwrap_or_else(|| "proxy served its fallback price".to_string());
                    let failures = self.failures.record_failure(CURRENT_PRICE_KEY);
                    warn!(
                        "{} returned fallback data for {} ({} consecutive failures): {}",
                        source.name(),
                        token_id,
                        failures,
                        reason
                    );

                    let mut point = fill_defaults(&quote, PriceSource::ProxyFallback, self.clock.now_millis());
                    point.fallback_reason = Some(reason);
                    return point;
                }
                Ok(quote) => {
                    let point = fill_defaults(&quote, source.tier(), self.clock.now_millis());
                    if point.defaulted.any() {
                        debug!("Defaulted missing fields for {}: {:?}", token_id, point.defaulted);
                    }

                    self.failures.record_success(CURRENT_PRICE_KEY);
                    self.cache.put(CURRENT_PRICE_KEY, CachedValue::Price(point.clone()));
                    info!("Fetched {} price {} via {}", token_id, point.usd, source.name());
                    return point;
                }
                Err(e) => {
                    warn!("Spot price via {} failed: {}", source.name(), e);
                    last_error = Some(format!("{}: {}", source.name(), e));
                }
            }
        }

        let reason = last_error.unwrap_or_else(|| "no spot price sources configured".to_string());
        let failures = self.failures.record_failure(CURRENT_PRICE_KEY);
        warn!(
            "All spot price sources failed for {} ({} consecutive failures), using fallback {}",
            token_id, failures, self.settings.fallback_price
        );

        PricePoint::fallback(self.settings.fallback_price, self.clock.now_millis(), reason)
    }

    /// Historical series for `period`. Never fails; on error the series is
    /// synthesized and `is_fallback` is set.
    pub async fn get_historical_prices(&self, period: Period) -> PriceSeries {
        let cache_key = period.cache_key();

        if let Some(cached) = self.cache.get_series(&cache_key) {
            debug!("Cache hit for {}", cache_key);
            return cached;
        }

        let spec = self.settings.periods.get(period);
        let token_id = self.settings.token_id.as_str();

        let fetched = self
            .attempt(self.history_source.fetch_market_chart(token_id, spec.days, spec.granularity))
            .await
            .and_then(|chart| build_series(chart, period));

        match fetched {
            Ok(series) => {
                self.failures.record_success(&cache_key);
                self.cache.put(cache_key.clone(), CachedValue::Series(series.clone()));
                info!("Fetched {} points for {}", series.points.len(), cache_key);
                series
            }
            Err(e) => {
                let failures = self.failures.record_failure(&cache_key);
                warn!(
                    "Historical prices for {} failed ({} consecutive failures), using fallback: {}",
                    cache_key, failures, e
                );
                synthesize_series(period, spec.days, self.settings.fallback_price, self.clock.now_millis())
            }
        }
    }

    pub async fn convert_to_fiat(&self, token_amount: f64) -> Result<f64, ConversionError> {
        self.quote_to_fiat(token_amount).await.map(|r| r.fiat_amount)
    }

    pub async fn convert_to_token(&self, fiat_amount: f64) -> Result<f64, ConversionError> {
        self.quote_to_token(fiat_amount).await.map(|r| r.token_amount)
    }

    /// Like `convert_to_fiat`, keeping the rate and its observation time.
    pub async fn quote_to_fiat(&self, token_amount: f64) -> Result<ConversionResult, ConversionError> {
        conversion::validate_amount(token_amount)?;
        let price = self.get_current_price().await;
        conversion::token_to_fiat(token_amount, &price)
    }

    pub async fn quote_to_token(&self, fiat_amount: f64) -> Result<ConversionResult, ConversionError> {
        conversion::validate_amount(fiat_amount)?;
        let price = self.get_current_price().await;
        conversion::fiat_to_token(fiat_amount, &price)
    }

    /// Drop one cached entry so the next read goes to the network.
    pub fn invalidate(&self, key: &str) -> bool {
        self.cache.remove(key)
    }

    /// Wipe every cached value and failure counter.
    pub fn clear_cache(&self) {
        self.cache.clear();
        self.failures.clear();
        info!("Price cache cleared");
    }

    async fn attempt<T, F>(&self, request: F) -> Result<T, SourceError>
    where
        F: Future<Output = Result<T, SourceError>>,
    {
        let budget = self.settings.fetch_timeout;
        match tokio::time::timeout(budget, request).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout(budget.as_millis() as u64)),
        }
    }
}

/// Turn a wire quote into a `PricePoint`, filling absent auxiliary fields with
/// `0` and recording which ones were filled.
pub fn fill_defaults(quote: &SimplePriceQuote, source: PriceSource, observed_at_millis: i64) -> PricePoint {
    let defaulted = DefaultedFields {
        change_24h: quote.usd_24h_change.is_none(),
        market_cap: quote.usd_market_cap.is_none(),
        volume_24h: quote.usd_24h_vol.is_none(),
    };

    PricePoint {
        usd: quote.usd.max(0.0),
        observed_at_millis,
        change_24h_pct: quote.usd_24h_change.unwrap_or(0.0),
        market_cap_usd: quote.usd_market_cap.unwrap_or(0.0),
        volume_24h_usd: quote.usd_24h_vol.unwrap_or(0.0),
        source,
        defaulted,
        fallback_reason: None,
    }
}

/// Join prices with volumes by timestamp and order by time.
fn build_series(chart: MarketChart, period: Period) -> Result<PriceSeries, SourceError> {
    let volumes: HashMap<i64, f64> = chart.total_volumes.into_iter().collect();

    let mut points = chart
        .prices
        .into_iter()
        .map(|(timestamp_millis, price)| {
            if !price.is_finite() || price < 0.0 {
                return Err(SourceError::Malformed(format!(
                    "invalid price {} at {}",
                    price, timestamp_millis
                )));
            }
            Ok(HistoryPoint {
                timestamp_millis,
                price,
                volume_usd: volumes.get(&timestamp_millis).copied().unwrap_or(0.0),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    points.sort_by_key(|p| p.timestamp_millis);

    Ok(PriceSeries {
        points,
        period,
        currency: "usd".to_string(),
        is_fallback: false,
    })
}

/// One point per day of the window at `price`, the last one at `now_millis`.
pub fn synthesize_series(period: Period, days: u32, price: f64, now_millis: i64) -> PriceSeries {
    let days = days.max(1) as i64;
    let points = (0..days)
        .map(|i| HistoryPoint {
            timestamp_millis: now_millis - (days - 1 - i) * DAY_MILLIS,
            price,
            volume_usd: 0.0,
        })
        .collect();

    PriceSeries {
        points,
        period,
        currency: "usd".to_string(),
        is_fallback: true,
    }
}
