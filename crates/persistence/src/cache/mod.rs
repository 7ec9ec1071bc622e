//! In-memory caching layer for the quest catalog

use std::sync::RwLock;
use std::time::{Duration, Instant};
use turfpoint_core::Quest;

/// Cached item with expiration
struct CacheEntry<T> {
    value: T,
    inserted_at: Instant,
    ttl: Duration,
}

impl<T> CacheEntry<T> {
    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() > self.ttl
    }
}

/// Thread-safe TTL cache for the active quest catalog.
///
/// Definitions change only when an operator inserts one, so a short
/// staleness window on the listing surface is fine; inserts invalidate
/// eagerly anyway.
pub struct QuestCache {
    catalog: RwLock<Option<CacheEntry<Vec<Quest>>>>,
    default_ttl: Duration,
}

impl QuestCache {
    /// Create a new cache with the given TTL
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            catalog: RwLock::new(None),
            default_ttl,
        }
    }

    /// Get the cached catalog if not expired
    pub fn get(&self) -> Option<Vec<Quest>> {
        let cache = self.catalog.read().ok()?;
        let entry = cache.as_ref()?;

        if entry.is_expired() {
            None
        } else {
            Some(entry.value.clone())
        }
    }

    /// Replace the cached catalog
    pub fn set(&self, quests: Vec<Quest>) {
        if let Ok(mut cache) = self.catalog.write() {
            *cache = Some(CacheEntry {
                value: quests,
                inserted_at: Instant::now(),
                ttl: self.default_ttl,
            });
        }
    }

    /// Drop the cached catalog (e.g. after a definition changes)
    pub fn invalidate(&self) {
        if let Ok(mut cache) = self.catalog.write() {
            *cache = None;
        }
    }
}

impl Default for QuestCache {
    fn default() -> Self {
        // Quest definitions barely move; 60 seconds of staleness is fine
        Self::new(Duration::from_secs(60))
    }
}
