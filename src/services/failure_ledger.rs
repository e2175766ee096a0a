//! Consecutive-failure counters per cache key.
//!
//! Only used for observability and backoff decisions; correctness never
//! depends on these numbers.

use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct FailureLedger {
    counts: Mutex<HashMap<String, u32>>,
}

impl FailureLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bump the counter for `key` and return the new value.
    pub fn record_failure(&self, key: &str) -> u32 {
        let mut counts = self.counts.lock();
        let count = counts.entry(key.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    pub fn record_success(&self, key: &str) {
        self.counts.lock().remove(key);
    }

    pub fn count(&self, key: &str) -> u32 {
        self.counts.lock().get(key).copied().unwrap_or(0)
    }

    pub fn clear(&self) {
        self.counts.lock().clear();
    }
}
