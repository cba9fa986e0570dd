use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use moka::sync::Cache;

use crate::types::Token;

/// Memoized outcome of resolving an original query key.
///
/// `None` is an explicit "not found" marker.
#[derive(Debug, Clone)]
pub struct ResolvedCache {
    cache: Cache<String, Option<Token>>,
    hits: Arc<AtomicU64>,
}

impl ResolvedCache {
    pub fn new(max_entries: u64) -> Self {
        let max_capacity = if max_entries == 0 { 1 } else { max_entries };
        let cache = Cache::builder().max_capacity(max_capacity).build();
        Self {
            cache,
            hits: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn get(&self, key: &str) -> Option<Option<Token>> {
        let outcome = self.cache.get(key)?;
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(outcome)
    }

    pub fn insert(&self, key: &str, outcome: Option<Token>) {
        self.cache.insert(key.to_string(), outcome);
    }

    /// Removes every entry now; `invalidate_all` is lazy and would also hide
    /// entries inserted in the same clock tick.
    pub fn clear(&self) {
        let keys: Vec<Arc<String>> = self.cache.iter().map(|(key, _)| key).collect();
        for key in keys {
            self.cache.invalidate(key.as_str());
        }
    }

    /// Drops every outcome that a change to the entries under `touched`
    /// could affect.
    ///
    /// An original key resolves through itself or itself plus one of
    /// `suffixes`, so each touched key maps back to at most
    /// `1 + suffixes.len()` cached keys. Covers misses that may now hit,
    /// hits whose entry was purged, and fallbacks shadowed by a better match.
    pub fn invalidate_touched<'a>(
        &self,
        touched: impl IntoIterator<Item = &'a String>,
        suffixes: &[String],
    ) {
        for key in touched {
            self.cache.invalidate(key.as_str());
            for suffix in suffixes {
                if let Some(original) = key.strip_suffix(suffix.as_str()) {
                    self.cache.invalidate(original);
                }
            }
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }
}
