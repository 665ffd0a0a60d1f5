//! TTL cache for probe results.
//!
//! Entries are keyed by `(provider, tier)` and expire lazily: an expired entry
//! stays in the map but is reported as absent by [`ProbeCache::get`]. There is
//! no background reaper; [`ProbeCache::stats`] scans the whole map.

use crate::tier::Tier;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

/// Longest lifetime an entry can have; larger TTLs are clamped to it
pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Entry with instant-based expiry
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            expires_at: now.checked_add(ttl.min(MAX_TTL)).unwrap_or(now),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Cache statistics computed by a full scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Entries held, expired or not
    pub total: usize,
    /// Entries past their expiry
    pub expired: usize,
    /// Entries still valid
    pub active: usize,
}

/// A live cache entry returned by [`ProbeCache::snapshot`]
#[derive(Debug, Clone)]
pub struct CachedValue<V> {
    /// Provider name
    pub provider: String,
    /// Tier
    pub tier: Tier,
    /// Cached value
    pub value: V,
    /// Time left before expiry
    pub remaining: Duration,
}

/// Thread-safe `(provider, tier) -> value` store with per-entry expiry
#[derive(Debug)]
pub struct ProbeCache<V> {
    entries: RwLock<HashMap<String, BTreeMap<Tier, CacheEntry<V>>>>,
}

impl<V: Clone> ProbeCache<V> {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Get a value that has not yet expired
    ///
    /// Returns `None` both for keys never set and for expired keys.
    #[must_use]
    pub fn get(&self, provider: &str, tier: Tier) -> Option<V> {
        let now = Instant::now();
        let entries = self.entries.read();
        entries
            .get(provider)
            .and_then(|tiers| tiers.get(&tier))
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    /// Insert or overwrite a value
    pub fn set(&self, provider: &str, tier: Tier, value: V, ttl: Duration) {
        let mut entries = self.entries.write();
        entries
            .entry(provider.to_string())
            .or_default()
            .insert(tier, CacheEntry::new(value, ttl));
    }

    /// Remove every tier entry for one provider
    ///
    /// Returns the number of entries removed.
    pub fn clear_provider(&self, provider: &str) -> usize {
        let mut entries = self.entries.write();
        entries.remove(provider).map_or(0, |tiers| tiers.len())
    }

    /// Count total, expired and active entries
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entries = self.entries.read();
        let mut stats = CacheStats::default();
        for entry in entries.values().flat_map(BTreeMap::values) {
            stats.total += 1;
            if entry.is_expired(now) {
                stats.expired += 1;
            } else {
                stats.active += 1;
            }
        }
        stats
    }

    /// Every unexpired entry with its remaining lifetime
    #[must_use]
    pub fn snapshot(&self) -> Vec<CachedValue<V>> {
        let now = Instant::now();
        let entries = self.entries.read();
        entries
            .iter()
            .flat_map(|(provider, tiers)| {
                tiers.iter().filter_map(move |(tier, entry)| {
                    (!entry.is_expired(now)).then(|| CachedValue {
                        provider: provider.clone(),
                        tier: *tier,
                        value: entry.value.clone(),
                        remaining: entry.expires_at.saturating_duration_since(now),
                    })
                })
            })
            .collect()
    }
}

impl<V: Clone> Default for ProbeCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
