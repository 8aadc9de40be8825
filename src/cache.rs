//! # Recognition Result Cache
//!
//! An explicit TTL-based cache for per-tile recognition results, passed into
//! the pipeline by the caller rather than held in global state. The key is a
//! hash of the encoded tile content together with the document class (the
//! same pixels recognize differently under different class hints), so a
//! re-scan of an unchanged page skips the remote calls entirely.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::document_class::DocumentClass;

/// Cache entry with its expiration time
#[derive(Debug, Clone)]
struct CacheEntry {
    text: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// Cache key: tile content hash plus the document class hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCacheKey {
    content_hash: u64,
    class: DocumentClass,
}

impl TileCacheKey {
    /// Build a key from the encoded tile bytes and the class hint
    pub fn for_tile(tile_png: &[u8], class: DocumentClass) -> Self {
        let mut hasher = DefaultHasher::new();
        tile_png.hash(&mut hasher);
        Self {
            content_hash: hasher.finish(),
            class,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Total number of live entries
    pub entries: usize,
    /// Number of hits
    pub hits: u64,
    /// Number of misses
    pub misses: u64,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

/// Thread-safe recognition result cache with caller-controlled TTL and a
/// maximum entry count. Shared across concurrent tile tasks behind an `Arc`,
/// so all methods take `&self`.
pub struct RecognitionCache {
    data: RwLock<HashMap<TileCacheKey, CacheEntry>>,
    stats: RwLock<CacheStats>,
    ttl: Duration,
    max_entries: usize,
}

impl RecognitionCache {
    /// Create a cache with the given TTL and capacity
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            stats: RwLock::new(CacheStats::default()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Get a cached recognition result
    pub fn get(&self, key: &TileCacheKey) -> Option<String> {
        let data = self.data.read().expect("cache lock poisoned");
        let mut stats = self.stats.write().expect("cache stats lock poisoned");

        match data.get(key) {
            Some(entry) if !entry.is_expired() => {
                stats.hits += 1;
                Some(entry.text.clone())
            }
            _ => {
                stats.misses += 1;
                None
            }
        }
    }

    /// Cache a recognition result, evicting expired and oldest entries when
    /// the capacity is reached
    pub fn insert(&self, key: TileCacheKey, text: String) {
        let mut data = self.data.write().expect("cache lock poisoned");

        if data.len() >= self.max_entries {
            data.retain(|_, entry| !entry.is_expired());
        }
        if data.len() >= self.max_entries {
            // Still full: drop the entry closest to expiry
            if let Some(oldest) = data
                .iter()
                .min_by_key(|(_, entry)| entry.expires_at)
                .map(|(key, _)| *key)
            {
                data.remove(&oldest);
                debug!(target: "scan_pipeline", "Cache full, evicted oldest entry");
            }
        }

        data.insert(
            key,
            CacheEntry {
                text,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Clear all expired entries
    pub fn cleanup(&self) {
        let mut data = self.data.write().expect("cache lock poisoned");
        let before = data.len();
        data.retain(|_, entry| !entry.is_expired());
        let removed = before - data.len();
        if removed > 0 {
            debug!(
                target: "scan_pipeline",
                removed = %removed,
                "Cache cleanup removed expired entries"
            );
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.read().expect("cache stats lock poisoned").clone();
        stats.entries = self.data.read().expect("cache lock poisoned").len();

        let total = stats.hits + stats.misses;
        if total > 0 {
            stats.hit_rate = stats.hits as f64 / total as f64;
        }
        stats
    }

    /// Clear all entries and statistics
    pub fn clear(&self) {
        self.data.write().expect("cache lock poisoned").clear();
        *self.stats.write().expect("cache stats lock poisoned") = CacheStats::default();
    }
}
