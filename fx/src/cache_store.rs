//! Key/value cache store with TTL support.

use dashmap::DashMap;
use ratebook_common::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Shared byte cache with per-entry expiry.
pub trait CacheStore: Send + Sync {
    /// Get the value stored under `key`, or `None` if absent or expired.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key` for `ttl`.
    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Remove `key`. Removing an absent key is not an error.
    fn delete(&self, key: &str) -> Result<()>;
}

/// Cached value entry.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Vec<u8>,
    cached_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn new(value: Vec<u8>, ttl: Duration) -> Self {
        Self {
            value,
            cached_at: Instant::now(),
            ttl,
        }
    }

    fn is_valid(&self) -> bool {
        self.cached_at.elapsed() < self.ttl
    }
}

/// Configuration for the in-memory cache store.
#[derive(Debug, Clone)]
pub struct CacheStoreConfig {
    /// Entry count above which expired entries are evicted on insert.
    pub max_entries: usize,
}

impl Default for CacheStoreConfig {
    fn default() -> Self {
        Self { max_entries: 10000 }
    }
}

/// Thread-safe in-memory cache store.
pub struct MemoryCacheStore {
    cache: DashMap<String, CacheEntry>,
    config: CacheStoreConfig,
}

impl MemoryCacheStore {
    /// Create a new cache store with default configuration.
    pub fn new() -> Self {
        Self::with_config(CacheStoreConfig::default())
    }

    /// Create a new cache store with custom configuration.
    pub fn with_config(config: CacheStoreConfig) -> Self {
        Self {
            cache: DashMap::new(),
            config,
        }
    }

    /// Whether a live entry exists for `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.cache.get(key).map(|e| e.is_valid()).unwrap_or(false)
    }

    /// Clear all entries.
    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Get the number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Evict expired entries.
    pub fn evict_expired(&self) {
        self.cache.retain(|_, entry| entry.is_valid());
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let total = self.cache.len();
        let valid = self.cache.iter().filter(|e| e.is_valid()).count();

        CacheStats {
            total_entries: total,
            valid_entries: valid,
            expired_entries: total - valid,
        }
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.cache.get(key) {
            Some(entry) if entry.is_valid() => return Ok(Some(entry.value.clone())),
            Some(_) => {}
            None => return Ok(None),
        }
        // A concurrent set may have replaced the expired entry since the read.
        if self.cache.remove_if(key, |_, entry| !entry.is_valid()).is_some() {
            debug!(key, "Cache entry expired");
        }
        Ok(None)
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        if self.cache.len() >= self.config.max_entries {
            self.evict_expired();
        }
        self.cache.insert(key.to_string(), CacheEntry::new(value, ttl));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.cache.remove(key);
        Ok(())
    }
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
}

/// Shared cache store.
pub type SharedCacheStore = Arc<dyn CacheStore>;
