//! Bounded embedding cache.
//!
//! Process-local mapping from content fingerprint to vector with TTL and
//! capacity eviction. Stale embeddings for mutated inputs age out via the
//! TTL — there is no explicit invalidation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::sync::Cache;

use anima_core::config::EmbeddingConfig;
use anima_core::models::CacheStats;

/// A cached embedding and the provider that produced it.
#[derive(Debug, Clone)]
pub struct CachedEmbedding {
    pub vector: Vec<f32>,
    pub provider: String,
}

/// Fingerprint-keyed embedding cache with hit/miss counters.
pub struct EmbeddingCache {
    cache: Cache<String, CachedEmbedding>,
    hits: AtomicU64,
    misses: AtomicU64,
    max_size: u64,
}

impl EmbeddingCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();
        Self {
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            max_size: capacity,
        }
    }

    pub fn from_config(cfg: &EmbeddingConfig) -> Self {
        Self::new(cfg.cache_capacity, Duration::from_secs(cfg.cache_ttl_secs))
    }

    /// Look up by fingerprint, counting the outcome.
    pub fn get(&self, fingerprint: &str) -> Option<CachedEmbedding> {
        match self.cache.get(fingerprint) {
            Some(hit) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(hit)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, fingerprint: String, vector: Vec<f32>, provider: String) {
        self.cache.insert(fingerprint, CachedEmbedding { vector, provider });
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
            size: self.cache.entry_count(),
            max_size: self.max_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_cache() -> EmbeddingCache {
        EmbeddingCache::new(100, Duration::from_secs(3600))
    }

    #[test]
    fn miss_then_hit() {
        let cache = small_cache();
        assert!(cache.get("fp1").is_none());
        cache.insert("fp1".to_string(), vec![0.5; 4], "local".to_string());
        let hit = cache.get("fp1").expect("should hit");
        assert_eq!(hit.vector.len(), 4);
        assert_eq!(hit.provider, "local");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_cache_reports_zero_rate() {
        let stats = small_cache().stats();
        assert_eq!(stats.hit_rate, 0.0);
        assert_eq!(stats.max_size, 100);
    }

    #[test]
    fn ttl_expires_entries() {
        let cache = EmbeddingCache::new(10, Duration::from_millis(10));
        cache.insert("fp".to_string(), vec![1.0], "local".to_string());
        std::thread::sleep(Duration::from_millis(30));
        assert!(cache.get("fp").is_none());
    }
}
