//! Health Monitor
//!
//! Probes the proxy (HEAD) and, if that probe errors, the upstream `/ping`.
//! Healthy means a 2xx answer within the latency threshold. The status is
//! kept separately from the oracle's cache and failure ledger.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::OracleConfig;
use crate::models::health::HealthStatus;
use crate::services::clock::{Clock, SystemClock};
use crate::services::coingecko::{build_http_client, CoinGeckoService};
use crate::services::price_proxy::PriceProxyClient;
use crate::services::price_source::HealthProbe;
use crate::services::task_handle::{ticker, TaskHandle};

pub struct HealthMonitor {
    /// Tried in order; the next one runs only if the previous got no response.
    probes: Vec<Arc<dyn HealthProbe>>,
    timeout: Duration,
    latency_threshold: Duration,
    clock: Arc<dyn Clock>,
    status: RwLock<HealthStatus>,
}

impl HealthMonitor {
    pub fn new(
        probes: Vec<Arc<dyn HealthProbe>>,
        timeout: Duration,
        latency_threshold: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            probes,
            timeout,
            latency_threshold,
            clock,
            status: RwLock::new(HealthStatus::unchecked()),
        }
    }

    pub fn from_config(config: &OracleConfig) -> Result<Self, reqwest::Error> {
        let client = build_http_client(config.health_timeout)?;

        let mut probes: Vec<Arc<dyn HealthProbe>> = Vec::new();
        if let Some(proxy_url) = &config.proxy_url {
            probes.push(Arc::new(PriceProxyClient::new(client.clone(), proxy_url.clone())));
        }
        probes.push(Arc::new(CoinGeckoService::new(
            client,
            config.provider_base_url.clone(),
            config.provider_api_key.clone(),
        )));

        Ok(Self::new(
            probes,
            config.health_timeout,
            config.health_latency_threshold,
            Arc::new(SystemClock),
        ))
    }

    /// Last stored status without probing.
    pub fn status(&self) -> HealthStatus {
        self.status.read().clone()
    }

    pub async fn check_health(&self) -> HealthStatus {
        let start = Instant::now();
        let mut outcome: Result<(String, u16), String> = Err("No health probes configured".to_string());

        for probe in &self.probes {
            match tokio::time::timeout(self.timeout, probe.probe()).await {
                Ok(Ok(status)) => {
                    outcome = Ok((probe.name().to_string(), status));
                    break;
                }
                Ok(Err(e)) => {
                    debug!("Health probe {} failed: {}", probe.name(), e);
                    outcome = Err(format!("{}: {}", probe.name(), e));
                }
                Err(_) => {
                    debug!("Health probe {} timed out", probe.name());
                    outcome = Err(format!(
                        "{}: no response within {} ms",
                        probe.name(),
                        self.timeout.as_millis()
                    ));
                }
            }
        }

        let elapsed = start.elapsed();
        let response_time_millis = elapsed.as_millis() as i64;

        let error = match outcome {
            Ok((name, status)) if !(200..300).contains(&status) => {
                Some(format!("{} responded with HTTP {}", name, status))
            }
            Ok((name, _)) if elapsed >= self.latency_threshold => Some(format!(
                "{} responded in {} ms (limit {} ms)",
                name,
                response_time_millis,
                self.latency_threshold.as_millis()
            )),
            Ok(_) => None,
            Err(e) => Some(e),
        };

        let status = HealthStatus {
            is_healthy: error.is_none(),
            last_check_millis: self.clock.now_millis(),
            response_time_millis: Some(response_time_millis),
            error,
        };

        match &status.error {
            None => debug!("Price provider healthy ({} ms)", response_time_millis),
            Some(e) => warn!("Price provider unhealthy: {}", e),
        }

        *self.status.write() = status.clone();
        status
    }

    /// Run `check_health` now and then every `interval` until the handle is stopped.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> TaskHandle {
        let monitor = self;
        let handle = tokio::spawn(async move {
            info!("Starting provider health checks (every {} seconds)", interval.as_secs());

            let mut ticks = ticker("health-monitor", interval);
            loop {
                ticks.tick().await;
                monitor.check_health().await;
            }
        });

        TaskHandle::new("health-monitor", handle)
    }
}
