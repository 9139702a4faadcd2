//! In-memory cache of conversion results
//!
//! Entries are keyed by URL identity plus the fingerprint of the settings
//! that produced them. Expiry is lazy: an entry older than the TTL is
//! dropped when it is looked up.

use crate::config::Config;
use crate::identity::ContentIdentity;
use crate::types::ConversionResult;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Cache key: identity of the URL and the configuration fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub identity: ContentIdentity,
    pub fingerprint: String,
}

impl CacheKey {
    pub fn new(identity: ContentIdentity, fingerprint: impl Into<String>) -> Self {
        Self {
            identity,
            fingerprint: fingerprint.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    result: ConversionResult,
    stored_at: Instant,
}

/// TTL cache with optional LRU capacity
///
/// All entries sit behind one process-wide `std::sync::Mutex<LruCache>`.
/// Lookups take the lock too, since a hit updates LRU recency. Every
/// operation is one short critical section that never spans an `.await`, so
/// a reader sees either the previous entry or the complete new one, and
/// contention is bounded by the number of conversions in flight.
#[derive(Debug)]
pub struct ResponseCache {
    enabled: bool,
    ttl: Duration,
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
}

impl ResponseCache {
    /// Unbounded cache with the given TTL
    pub fn new(ttl: Duration) -> Self {
        Self {
            enabled: true,
            ttl,
            entries: Mutex::new(LruCache::unbounded()),
        }
    }

    /// Cache evicting the least recently used entry beyond `max_entries`
    pub fn bounded(ttl: Duration, max_entries: NonZeroUsize) -> Self {
        Self {
            enabled: true,
            ttl,
            entries: Mutex::new(LruCache::new(max_entries)),
        }
    }

    /// A cache that stores nothing
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(Duration::ZERO)
        }
    }

    /// Build from the cache settings of a [`Config`]
    pub fn from_config(config: &Config) -> Self {
        if !config.cache_enabled {
            return Self::disabled();
        }
        match config.cache_max_entries.and_then(NonZeroUsize::new) {
            Some(max) => Self::bounded(config.cache_ttl, max),
            None => Self::new(config.cache_ttl),
        }
    }

    /// Fetch a live entry, evicting it if it has expired
    pub fn lookup(&self, key: &CacheKey) -> Option<ConversionResult> {
        if !self.enabled {
            return None;
        }
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let expired = match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                return Some(entry.result.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    /// Insert or replace an entry
    pub fn store(&self, key: CacheKey, result: ConversionResult) {
        if !self.enabled {
            return;
        }
        let entry = CacheEntry {
            result,
            stored_at: Instant::now(),
        };
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(key, entry);
    }

    /// Remove an entry
    pub fn invalidate(&self, key: &CacheKey) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop(key);
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of stored entries, including not yet evicted expired ones
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
