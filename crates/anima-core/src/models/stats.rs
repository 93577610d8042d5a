//! Runtime counters exposed by the metrics endpoints.

use serde::Serialize;

/// Embedding cache counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub size: u64,
    pub max_size: u64,
}

impl CacheStats {
    /// Qualitative status bucket for the metrics endpoint.
    pub fn status(&self) -> &'static str {
        let total = self.hits + self.misses;
        if total < 100 {
            "warming_up"
        } else if self.hit_rate >= 0.5 {
            "healthy"
        } else {
            "low_hit_rate"
        }
    }

    /// Operator-facing recommendation for the cache-stats endpoint.
    pub fn recommendation(&self) -> String {
        match self.status() {
            "warming_up" => "cache is warming up; re-check after more traffic".to_string(),
            "healthy" => "hit rate is healthy; no action needed".to_string(),
            _ => format!(
                "hit rate {:.0}% is low; consider raising capacity above {}",
                self.hit_rate * 100.0,
                self.max_size
            ),
        }
    }
}

/// Connection pool counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub total_connections: u32,
    pub idle_connections: u32,
    pub waiting_connections: usize,
}

impl PoolStats {
    pub fn status(&self) -> &'static str {
        if self.waiting_connections > crate::constants::POOL_WAITING_WARN_THRESHOLD {
            "saturated"
        } else {
            "healthy"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_status_buckets() {
        let warming = CacheStats {
            hits: 10,
            misses: 10,
            hit_rate: 0.5,
            size: 20,
            max_size: 100,
        };
        assert_eq!(warming.status(), "warming_up");

        let healthy = CacheStats {
            hits: 90,
            misses: 30,
            hit_rate: 0.75,
            size: 100,
            max_size: 100,
        };
        assert_eq!(healthy.status(), "healthy");

        let low = CacheStats {
            hits: 20,
            misses: 100,
            hit_rate: 0.17,
            size: 100,
            max_size: 100,
        };
        assert_eq!(low.status(), "low_hit_rate");
        assert!(low.recommendation().contains("low"));
    }

    #[test]
    fn pool_saturation() {
        let ok = PoolStats {
            total_connections: 10,
            idle_connections: 5,
            waiting_connections: 0,
        };
        assert_eq!(ok.status(), "healthy");

        let bad = PoolStats {
            total_connections: 50,
            idle_connections: 0,
            waiting_connections: 9,
        };
        assert_eq!(bad.status(), "saturated");
    }
}
