//! Cache Store
//!
//! In-memory key -> (value, timestamp) map with a single fixed TTL.
//! Entries are never evicted eagerly; expired entries are simply not returned.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::models::price::{PricePoint, PriceSeries};
use crate::services::clock::Clock;

/// Cache key of the spot price.
pub const CURRENT_PRICE_KEY: &str = "current-price";

/// Anything the oracle caches.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Price(PricePoint),
    Series(PriceSeries),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CachedValue,
    stored_at_millis: i64,
}

pub struct CacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl_millis: i64,
    clock: Arc<dyn Clock>,
}

impl CacheStore {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl_millis: ttl.as_millis() as i64,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_millis as u64)
    }

    /// Value for `key`, only while `now - stored_at < ttl`.
    pub fn get(&self, key: &str) -> Option<CachedValue> {
        let now = self.clock.now_millis();
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|entry| now - entry.stored_at_millis < self.ttl_millis)
            .map(|entry| entry.value.clone())
    }

    pub fn get_price(&self, key: &str) -> Option<PricePoint> {
        match self.get(key)? {
            CachedValue::Price(point) => Some(point),
            CachedValue::Series(_) => None,
        }
    }

    pub fn get_series(&self, key: &str) -> Option<PriceSeries> {
        match self.get(key)? {
            CachedValue::Series(series) => Some(series),
            CachedValue::Price(_) => None,
        }
    }

    /// Store `value` stamped with the current time, replacing any previous entry.
    pub fn put(&self, key: impl Into<String>, value: CachedValue) {
        let entry = CacheEntry {
            value,
            stored_at_millis: self.clock.now_millis(),
        };
        self.entries.write().insert(key.into(), entry);
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
