//! Reactive price feed
//!
//! Turns the pull-based oracle into continuously updated values:
//! a spot subscription polled on an interval with debounced manual refresh
//! and optional change alerts, and a historical subscription that follows
//! the requested period. Every subscription owns its tasks and cancels them
//! on `stop()` or drop.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tracing::{debug, info};

use crate::config::OracleConfig;
use crate::models::price::{ConversionResult, Period, PriceAlert, PricePoint, PriceSeries};
use crate::services::cache_store::CURRENT_PRICE_KEY;
use crate::services::conversion;
use crate::services::price_alerts::PriceAlerts;
use crate::services::price_oracle::PriceOracle;
use crate::services::task_handle::{ticker, TaskHandle};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedSettings {
    pub refresh_interval: Duration,
    pub refresh_debounce: Duration,
    pub alert_display: Duration,
}

impl From<&OracleConfig> for FeedSettings {
    fn from(config: &OracleConfig) -> Self {
        Self {
            refresh_interval: config.refresh_interval,
            refresh_debounce: config.refresh_debounce,
            alert_display: config.alert_display,
        }
    }
}

/// Snapshot published by a spot subscription.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpotState {
    pub price: Option<PricePoint>,
    pub loading: bool,
    /// Reason the current value is fallback data, if it is.
    pub error: Option<String>,
    /// Manual refreshes that actually reached the oracle.
    pub refresh_count: u64,
    pub last_refresh_millis: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryState {
    pub period: Period,
    pub series: Option<PriceSeries>,
    pub loading: bool,
}

#[derive(Clone)]
pub struct PriceFeed {
    oracle: Arc<PriceOracle>,
    settings: FeedSettings,
}

impl PriceFeed {
    pub fn new(oracle: Arc<PriceOracle>, settings: FeedSettings) -> Self {
        Self { oracle, settings }
    }

    pub fn oracle(&self) -> &Arc<PriceOracle> {
        &self.oracle
    }

    /// Start polling the spot price. With `alert_threshold_pct`, moves of at
    /// least that many percent between live observations raise an alert.
    pub fn subscribe_spot(&self, alert_threshold_pct: Option<f64>) -> SpotSubscription {
        let (state_tx, _) = watch::channel(SpotState::default());
        let shared = Arc::new(SpotShared {
            oracle: self.oracle.clone(),
            state: state_tx,
            alerts: alert_threshold_pct.map(|pct| PriceAlerts::new(pct, self.settings.alert_display)),
            last_live_price: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
        });

        let poller = {
            let shared = shared.clone();
            let every = self.settings.refresh_interval;
            tokio::spawn(async move {
                info!("Starting spot price subscription (every {} seconds)", every.as_secs());
                let mut interval = ticker("spot-poller", every);

                // First tick completes immediately and may reuse a fresh cache entry
                interval.tick().await;
                shared.load(false).await;

                // Entries are stamped when a fetch completes, after the tick that
                // started it, so later ticks would find them still valid
                loop {
                    interval.tick().await;
                    shared.load(true).await;
                }
            })
        };

        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
        let refresher = tokio::spawn(debounced_refresh(shared.clone(), refresh_rx, self.settings.refresh_debounce));

        SpotSubscription {
            shared,
            refresh_tx,
            poller: TaskHandle::new("spot-poller", poller),
            refresher: TaskHandle::new("spot-refresher", refresher),
        }
    }

    /// Follow the series for `period`; change it with `set_period`.
    pub fn subscribe_history(&self, period: Period) -> HistorySubscription {
        let (period_tx, mut period_rx) = watch::channel(period);
        let (state_tx, state_rx) = watch::channel(HistoryState {
            period,
            series: None,
            loading: true,
        });
        let refetch = Arc::new(Notify::new());

        let oracle = self.oracle.clone();
        let refetch_signal = refetch.clone();
        let task = tokio::spawn(async move {
            loop {
                let period = *period_rx.borrow_and_update();
                state_tx.send_modify(|state| {
                    state.period = period;
                    state.loading = true;
                });

                let series = oracle.get_historical_prices(period).await;

                // A newer period arrived mid-fetch; this result is stale
                if period_rx.has_changed().unwrap_or(false) {
                    continue;
                }

                state_tx.send_modify(|state| {
                    state.series = Some(series);
                    state.loading = false;
                });

                tokio::select! {
                    changed = period_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = refetch_signal.notified() => {
                        oracle.invalidate(&period.cache_key());
                    }
                }
            }
        });

        HistorySubscription {
            period_tx,
            state: state_rx,
            refetch,
            task: TaskHandle::new("history-subscription", task),
        }
    }
}

struct SpotShared {
    oracle: Arc<PriceOracle>,
    state: watch::Sender<SpotState>,
    alerts: Option<Arc<PriceAlerts>>,
    last_live_price: Mutex<Option<f64>>,
    /// Loads running right now; the poller and refresher may overlap.
    in_flight: AtomicUsize,
}

impl SpotShared {
    async fn load(&self, bypass_cache: bool) {
        self.state.send_modify(|state| {
            self.in_flight.fetch_add(1, Ordering::SeqCst);
            state.loading = true;
        });

        if bypass_cache {
            self.oracle.invalidate(CURRENT_PRICE_KEY);
        }
        let price = self.oracle.get_current_price().await;

        // Fallback values are estimates and never feed the alert comparison
        if !price.is_fallback() {
            let previous = self.last_live_price.lock().replace(price.usd);
            if let (Some(alerts), Some(previous)) = (&self.alerts, previous) {
                alerts.observe(previous, price.usd);
            }
        }

        self.state.send_modify(|state| {
            state.error = price.fallback_reason.clone();
            state.price = Some(price);
            state.loading = self.in_flight.fetch_sub(1, Ordering::SeqCst) > 1;
        });
    }

    async fn manual_refresh(&self) {
        let now = self.oracle.clock().now_millis();
        self.state.send_modify(|state| {
            state.refresh_count += 1;
            state.last_refresh_millis = Some(now);
        });
        debug!("Manual price refresh");
        self.load(true).await;
    }
}

/// Wait for a trigger, then for `delay` of quiet; triggers inside the window
/// restart it. One refresh per burst.
async fn debounced_refresh(shared: Arc<SpotShared>, mut triggers: mpsc::UnboundedReceiver<()>, delay: Duration) {
    while triggers.recv().await.is_some() {
        loop {
            match tokio::time::timeout(delay, triggers.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => return,
                Err(_) => break,
            }
        }
        shared.manual_refresh().await;
    }
}

pub struct SpotSubscription {
    shared: Arc<SpotShared>,
    refresh_tx: mpsc::UnboundedSender<()>,
    poller: TaskHandle,
    refresher: TaskHandle,
}

impl SpotSubscription {
    pub fn current(&self) -> SpotState {
        self.shared.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SpotState> {
        self.shared.state.subscribe()
    }

    /// Request a cache-bypassing refresh. Bursts collapse into one call.
    pub fn refresh(&self) {
        let _ = self.refresh_tx.send(());
    }

    pub fn current_alert(&self) -> Option<PriceAlert> {
        self.shared.alerts.as_ref().and_then(|alerts| alerts.current())
    }

    pub fn watch_alerts(&self) -> Option<watch::Receiver<Option<PriceAlert>>> {
        self.shared.alerts.as_ref().map(|alerts| alerts.subscribe())
    }

    /// Display-only conversion against the last observed rate. `None` for
    /// negative input or before the first price arrives.
    pub fn to_fiat_preview(&self, token_amount: f64) -> Option<f64> {
        let state = self.shared.state.borrow();
        let price = state.price.as_ref()?;
        conversion::token_to_fiat(token_amount, price).ok().map(|r| r.fiat_amount)
    }

    pub fn to_token_preview(&self, fiat_amount: f64) -> Option<f64> {
        let state = self.shared.state.borrow();
        let price = state.price.as_ref()?;
        conversion::fiat_to_token(fiat_amount, price).ok().map(|r| r.token_amount)
    }

    /// Oracle-backed conversion.
    pub async fn to_fiat(&self, token_amount: f64) -> Option<ConversionResult> {
        self.shared.oracle.quote_to_fiat(token_amount).await.ok()
    }

    pub async fn to_token(&self, fiat_amount: f64) -> Option<ConversionResult> {
        self.shared.oracle.quote_to_token(fiat_amount).await.ok()
    }

    pub fn is_running(&self) -> bool {
        self.poller.is_running()
    }

    pub fn stop(&mut self) {
        self.poller.stop();
        self.refresher.stop();
    }
}

pub struct HistorySubscription {
    period_tx: watch::Sender<Period>,
    state: watch::Receiver<HistoryState>,
    refetch: Arc<Notify>,
    task: TaskHandle,
}

impl HistorySubscription {
    pub fn current(&self) -> HistoryState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<HistoryState> {
        self.state.clone()
    }

    pub fn period(&self) -> Period {
        *self.period_tx.borrow()
    }

    /// Switch periods; a no-op when `period` is already current.
    pub fn set_period(&self, period: Period) {
        self.period_tx.send_if_modified(|current| {
            if *current == period {
                return false;
            }
            *current = period;
            true
        });
    }

    /// Drop the cached series for the current period and fetch it again.
    pub fn refetch(&self) {
        self.refetch.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    pub fn stop(&mut self) {
        self.task.stop();
    }
}
