use tokio::sync::watch;

use crate::models::price::PriceAlert;
use crate::services::price_feed::{PriceFeed, SpotState, SpotSubscription};
use crate::services::task_handle::TaskHandle;

/// Keeps the spot price warm and logs every update and alert.
pub struct PriceWatch {
    pub subscription: SpotSubscription,
    logger: TaskHandle,
}

impl PriceWatch {
    pub fn stop(&mut self) {
        self.subscription.stop();
        self.logger.stop();
    }
}

pub fn start_price_watch_job(feed: &PriceFeed, alert_threshold_pct: f64) -> PriceWatch {
    let subscription = feed.subscribe_spot(Some(alert_threshold_pct));
    let states = subscription.watch();
    let alerts = subscription.watch_alerts();

    let logger = tokio::spawn(log_updates(states, alerts));

    PriceWatch {
        subscription,
        logger: TaskHandle::new("price-watch-logger", logger),
    }
}

async fn log_updates(
    mut states: watch::Receiver<SpotState>,
    mut alerts: Option<watch::Receiver<Option<PriceAlert>>>,
) {
    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                if state.loading {
                    continue;
                }
                match (&state.price, &state.error) {
                    (Some(price), None) => tracing::debug!("Spot price {} via {:?}", price.usd, price.source),
                    (Some(price), Some(error)) => {
                        tracing::warn!("Serving estimated spot price {}: {}", price.usd, error)
                    }
                    (None, _) => {}
                }
            }
            changed = next_alert(&mut alerts) => {
                match changed {
                    Some(Some(alert)) => tracing::info!(
                        "Price alert: {:?} {:.2}% ({} -> {})",
                        alert.direction,
                        alert.change_pct,
                        alert.old_price,
                        alert.new_price
                    ),
                    Some(None) => {}
                    None => alerts = None,
                }
            }
        }
    }
}

/// Next alert slot value; `None` once the channel is closed. Pending forever
/// when there is no alert channel.
async fn next_alert(alerts: &mut Option<watch::Receiver<Option<PriceAlert>>>) -> Option<Option<PriceAlert>> {
    match alerts {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(rx.borrow_and_update().clone()),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}
