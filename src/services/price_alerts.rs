//! Threshold alerts on consecutive spot observations.
//!
//! A single slot: a newer alert replaces the current one, and every alert
//! clears itself after the display duration unless it was replaced first.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::models::price::{AlertDirection, PriceAlert};

/// Alert for a move from `old_price` to `new_price`, if `|Δ%| >= threshold_pct`.
pub fn evaluate_change(old_price: f64, new_price: f64, threshold_pct: f64) -> Option<PriceAlert> {
    if old_price <= 0.0 || !old_price.is_finite() || !new_price.is_finite() {
        return None;
    }

    let change_pct = (new_price - old_price) / old_price * 100.0;
    if change_pct.abs() < threshold_pct {
        return None;
    }

    let direction = if change_pct >= 0.0 {
        AlertDirection::Increase
    } else {
        AlertDirection::Decrease
    };

    Some(PriceAlert {
        direction,
        old_price,
        new_price,
        change_pct,
    })
}

pub struct PriceAlerts {
    threshold_pct: f64,
    display: Duration,
    slot: watch::Sender<Option<PriceAlert>>,
    generation: AtomicU64,
}

impl PriceAlerts {
    pub fn new(threshold_pct: f64, display: Duration) -> Arc<Self> {
        let (slot, _) = watch::channel(None);
        Arc::new(Self {
            threshold_pct: threshold_pct.abs(),
            display,
            slot,
            generation: AtomicU64::new(0),
        })
    }

    pub fn threshold_pct(&self) -> f64 {
        self.threshold_pct
    }

    pub fn current(&self) -> Option<PriceAlert> {
        self.slot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<PriceAlert>> {
        self.slot.subscribe()
    }

    /// Compare two observations and, on a qualifying move, publish the alert
    /// and schedule its removal.
    pub fn observe(self: &Arc<Self>, old_price: f64, new_price: f64) -> Option<PriceAlert> {
        let alert = evaluate_change(old_price, new_price, self.threshold_pct)?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        tracing::info!(
            "Price {:?} of {:.2}% ({} -> {})",
            alert.direction,
            alert.change_pct,
            old_price,
            new_price
        );
        self.slot.send_replace(Some(alert.clone()));

        let weak = Arc::downgrade(self);
        let display = self.display;
        tokio::spawn(async move {
            tokio::time::sleep(display).await;
            if let Some(alerts) = weak.upgrade() {
                if alerts.generation.load(Ordering::SeqCst) == generation {
                    alerts.slot.send_replace(None);
                }
            }
        });

        Some(alert)
    }
}
