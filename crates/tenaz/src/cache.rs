//! Best-known-locator cache.
//!
//! Maps a caller-supplied stable key to the chain index (and locator) that
//! last resolved successfully. The cache is advisory: a hit only moves that
//! candidate to the front of the structural walk. The candidate is still
//! resolved and verified like any other, and a stale entry costs at most
//! one extra bounded attempt.
//!
//! Entries are only ever inserted or overwritten (last write wins), so
//! concurrent readers and writers never observe a torn state.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

use crate::locator::{LocatorChain, LocatorSpec};

/// One remembered success
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Index into the chain that succeeded
    pub chain_index: usize,
    /// The locator at that index when it succeeded
    pub locator: LocatorSpec,
}

/// Thread-safe, injected best-known-locator cache
#[derive(Debug, Default)]
pub struct LocatorCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl LocatorCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Preferred starting index for `chain` under `key`.
    ///
    /// Only honored when the chain still holds the remembered locator at
    /// the remembered index.
    #[must_use]
    pub fn preferred_index(&self, key: &str, chain: &LocatorChain) -> Option<usize> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let entry = entries.get(key)?;
        if chain.get(entry.chain_index) == Some(&entry.locator) {
            debug!(key, index = entry.chain_index, "locator cache hit");
            Some(entry.chain_index)
        } else {
            debug!(key, "locator cache entry does not match chain, ignoring");
            None
        }
    }

    /// Remember that `chain[index]` resolved under `key`
    pub fn record(&self, key: &str, chain: &LocatorChain, index: usize) {
        let Some(locator) = chain.get(index) else {
            return;
        };
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.insert(
            key.to_string(),
            CacheEntry {
                chain_index: index,
                locator: locator.clone(),
            },
        );
    }

    /// Look up the raw entry for `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Number of keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether the cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of all entries, for diagnostics
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, CacheEntry> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn chain() -> LocatorChain {
        LocatorChain::new(vec![
            LocatorSpec::css("#submit").unwrap(),
            LocatorSpec::text("Submit").unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn test_empty_cache_has_no_preference() {
        let cache = LocatorCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.preferred_index("login.submit", &chain()), None);
    }

    #[test]
    fn test_record_then_prefer() {
        let cache = LocatorCache::new();
        cache.record("login.submit", &chain(), 1);
        assert_eq!(cache.preferred_index("login.submit", &chain()), Some(1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_last_write_wins() {
        let cache = LocatorCache::new();
        cache.record("k", &chain(), 1);
        cache.record("k", &chain(), 0);
        assert_eq!(cache.get("k").unwrap().chain_index, 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_entry_ignored_when_chain_changed() {
        let cache = LocatorCache::new();
        cache.record("k", &chain(), 1);
        let edited = LocatorChain::new(vec![
            LocatorSpec::css("#submit").unwrap(),
            LocatorSpec::text("Send").unwrap(),
        ])
        .unwrap();
        assert_eq!(cache.preferred_index("k", &edited), None);
    }

    #[test]
    fn test_out_of_range_record_ignored() {
        let cache = LocatorCache::new();
        cache.record("k", &chain(), 5);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_writers() {
        let cache = Arc::new(LocatorCache::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        cache.record(&format!("key-{}", i % 5), &chain(), (t + i) % 2);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 5);
        for (_, entry) in cache.snapshot() {
            assert!(entry.chain_index < 2);
        }
    }
}
