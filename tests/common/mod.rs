//! Shared fixtures: scripted price sources and a manually driven clock.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use token_price_oracle::config::PeriodTable;
use token_price_oracle::error::SourceError;
use token_price_oracle::models::price::{Granularity, PriceSource};
use token_price_oracle::services::cache_store::CacheStore;
use token_price_oracle::services::clock::{Clock, ManualClock};
use token_price_oracle::services::failure_ledger::FailureLedger;
use token_price_oracle::services::price_oracle::{OracleSettings, PriceOracle};
use token_price_oracle::services::price_source::{HistorySource, MarketChart, SimplePriceQuote, SpotPriceSource};

pub const TOKEN_ID: &str = "gooddollar";
pub const FALLBACK_PRICE: f64 = 0.0001;
pub const START_MILLIS: i64 = 1_700_000_000_000;
pub const DAY_MILLIS: i64 = 86_400_000;

/// One scripted answer. The last reply in a script repeats forever.
#[derive(Debug, Clone)]
pub enum Reply<T> {
    Ok(T),
    Fail(&'static str),
    /// Never answers within any sane timeout.
    Hang,
    /// Answers after the given latency.
    Slow(T, Duration),
}

pub fn quote(usd: f64) -> SimplePriceQuote {
    SimplePriceQuote {
        usd,
        usd_24h_change: Some(1.0),
        usd_market_cap: Some(1_000_000.0),
        usd_24h_vol: Some(50_000.0),
        ..Default::default()
    }
}

pub fn proxy_fallback_quote() -> SimplePriceQuote {
    SimplePriceQuote {
        usd: FALLBACK_PRICE,
        usd_24h_change: Some(0.0),
        usd_market_cap: Some(0.0),
        usd_24h_vol: Some(0.0),
        proxy_fallback: true,
        proxy_error: Some("upstream rate limited".to_string()),
    }
}

/// Daily chart of `days + 1` points ending at `end_millis`, prices 1.0, 1.1, ...
pub fn daily_chart(days: i64, end_millis: i64) -> MarketChart {
    let prices: Vec<(i64, f64)> = (0..=days)
        .map(|i| (end_millis - (days - i) * DAY_MILLIS, 1.0 + i as f64 / 10.0))
        .collect();
    let total_volumes = prices.iter().map(|(ts, _)| (*ts, 10_000.0)).collect();
    MarketChart { prices, total_volumes }
}

/// Wall clock that follows tokio time, so latency shows up in cache timestamps.
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now_millis(&self) -> i64 {
        START_MILLIS + self.origin.elapsed().as_millis() as i64
    }
}

struct Script<T> {
    replies: Mutex<VecDeque<Reply<T>>>,
    calls: AtomicUsize,
}

impl<T: Clone> Script<T> {
    fn new(replies: Vec<Reply<T>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
        }
    }

    fn next(&self) -> Reply<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut replies = self.replies.lock();
        if replies.len() > 1 {
            replies.pop_front().expect("non-empty script")
        } else {
            replies.front().cloned().unwrap_or(Reply::Fail("empty script"))
        }
    }

    fn push(&self, reply: Reply<T>) {
        let mut replies = self.replies.lock();
        replies.clear();
        replies.push_back(reply);
    }

    async fn answer(&self) -> Result<T, SourceError> {
        match self.next() {
            Reply::Ok(value) => Ok(value),
            Reply::Fail(reason) => Err(SourceError::Malformed(reason.to_string())),
            Reply::Slow(value, latency) => {
                tokio::time::sleep(latency).await;
                Ok(value)
            }
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(SourceError::Malformed("hung".to_string()))
            }
        }
    }
}

pub struct ScriptedSpotSource {
    name: &'static str,
    tier: PriceSource,
    script: Script<SimplePriceQuote>,
}

impl ScriptedSpotSource {
    pub fn new(name: &'static str, tier: PriceSource, replies: Vec<Reply<SimplePriceQuote>>) -> Arc<Self> {
        Arc::new(Self {
            name,
            tier,
            script: Script::new(replies),
        })
    }

    pub fn calls(&self) -> usize {
        self.script.calls.load(Ordering::SeqCst)
    }

    /// Replace the script with a single repeating reply.
    pub fn set_reply(&self, reply: Reply<SimplePriceQuote>) {
        self.script.push(reply);
    }
}

#[async_trait]
impl SpotPriceSource for ScriptedSpotSource {
    fn name(&self) -> &str {
        self.name
    }

    fn tier(&self) -> PriceSource {
        self.tier
    }

    async fn fetch_spot(&self, token_id: &str) -> Result<SimplePriceQuote, SourceError> {
        assert_eq!(token_id, TOKEN_ID);
        self.script.answer().await
    }
}

pub struct ScriptedHistorySource {
    script: Script<MarketChart>,
    requests: Mutex<Vec<(u32, Granularity)>>,
}

impl ScriptedHistorySource {
    pub fn new(replies: Vec<Reply<MarketChart>>) -> Arc<Self> {
        Arc::new(Self {
            script: Script::new(replies),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.script.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<(u32, Granularity)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl HistorySource for ScriptedHistorySource {
    async fn fetch_market_chart(
        &self,
        _token_id: &str,
        days: u32,
        granularity: Granularity,
    ) -> Result<MarketChart, SourceError> {
        self.requests.lock().push((days, granularity));
        self.script.answer().await
    }
}

pub struct Harness {
    pub oracle: Arc<PriceOracle>,
    pub clock: Arc<ManualClock>,
    pub proxy: Arc<ScriptedSpotSource>,
    pub upstream: Arc<ScriptedSpotSource>,
    pub history: Arc<ScriptedHistorySource>,
}

pub fn harness(
    proxy: Vec<Reply<SimplePriceQuote>>,
    upstream: Vec<Reply<SimplePriceQuote>>,
    history: Vec<Reply<MarketChart>>,
    cache_ttl: Duration,
) -> Harness {
    let clock = Arc::new(ManualClock::new(START_MILLIS));
    let proxy = ScriptedSpotSource::new("proxy", PriceSource::Proxy, proxy);
    let upstream = ScriptedSpotSource::new("coingecko", PriceSource::Upstream, upstream);
    let history = ScriptedHistorySource::new(history);

    let spot_sources: Vec<Arc<dyn SpotPriceSource>> = vec![proxy.clone(), upstream.clone()];
    let oracle = build_oracle(clock.clone(), spot_sources, history.clone(), cache_ttl);

    Harness {
        oracle,
        clock,
        proxy,
        upstream,
        history,
    }
}

/// Oracle over a single upstream tier whose cache runs on tokio time.
pub fn tokio_time_oracle(
    upstream: Vec<Reply<SimplePriceQuote>>,
    cache_ttl: Duration,
) -> (Arc<PriceOracle>, Arc<ScriptedSpotSource>) {
    let upstream = ScriptedSpotSource::new("coingecko", PriceSource::Upstream, upstream);
    let spot_sources: Vec<Arc<dyn SpotPriceSource>> = vec![upstream.clone()];
    let oracle = build_oracle(
        Arc::new(TokioClock::new()),
        spot_sources,
        ScriptedHistorySource::new(vec![]),
        cache_ttl,
    );
    (oracle, upstream)
}

fn build_oracle(
    clock: Arc<dyn Clock>,
    spot_sources: Vec<Arc<dyn SpotPriceSource>>,
    history: Arc<ScriptedHistorySource>,
    cache_ttl: Duration,
) -> Arc<PriceOracle> {
    Arc::new(PriceOracle::new(
        OracleSettings {
            token_id: TOKEN_ID.to_string(),
            fallback_price: FALLBACK_PRICE,
            fetch_timeout: Duration::from_secs(10),
            periods: PeriodTable::default(),
        },
        spot_sources,
        history,
        Arc::new(CacheStore::new(cache_ttl, clock.clone())),
        Arc::new(FailureLedger::new()),
        clock,
    ))
}
